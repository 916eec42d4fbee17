//! Observability counters.
//!
//! Updated by the engines for external reporting; nothing in the protocol
//! reads them back.

use std::fmt;

/// Counters owned by the sender engine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderStats {
    pub messages_accepted: u64, // submissions that got a sequence number
    pub window_full: u64,       // submissions dropped for lack of window space
    pub packets_sent: u64,      // first transmissions
    pub packets_resent: u64,    // retransmissions after a timeout
    pub acks_received: u64,     // intact acknowledgments, duplicates included
    pub new_acks: u64,          // acknowledgments that marked an unacked slot
    pub corrupted_acks: u64,    // acknowledgments discarded by the integrity check
}

/// Counters owned by the receiver engine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverStats {
    pub packets_received: u64,   // intact arrivals, duplicates included
    pub corrupted_packets: u64,  // arrivals discarded by the integrity check
    pub duplicates: u64,         // intact arrivals that were not buffered
    pub messages_delivered: u64, // payloads handed to the application
    pub acks_sent: u64,
}

impl fmt::Display for SenderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  messages accepted       : {}", self.messages_accepted)?;
        writeln!(f, "  dropped (window full)   : {}", self.window_full)?;
        writeln!(f, "  packets sent            : {}", self.packets_sent)?;
        writeln!(f, "  packets resent          : {}", self.packets_resent)?;
        writeln!(f, "  ACKs received           : {}", self.acks_received)?;
        writeln!(f, "  new ACKs                : {}", self.new_acks)?;
        write!(f, "  corrupted ACKs          : {}", self.corrupted_acks)
    }
}

impl fmt::Display for ReceiverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  packets received intact : {}", self.packets_received)?;
        writeln!(f, "  corrupted packets       : {}", self.corrupted_packets)?;
        writeln!(f, "  duplicates              : {}", self.duplicates)?;
        writeln!(f, "  messages delivered      : {}", self.messages_delivered)?;
        write!(f, "  ACKs sent               : {}", self.acks_sent)
    }
}

/// Counters kept by one direction of an emulated link.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkStats {
    pub to_network: u64, // packets handed to the link
    pub lost: u64,
    pub corrupted: u64,
}

impl LinkStats {
    /// Sum of two directions.
    pub fn combined(&self, other: &LinkStats) -> LinkStats {
        LinkStats {
            to_network: self.to_network + other.to_network,
            lost: self.lost + other.lost,
            corrupted: self.corrupted + other.corrupted,
        }
    }
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  packets to network      : {}", self.to_network)?;
        writeln!(f, "  packets lost            : {}", self.lost)?;
        write!(f, "  packets corrupted       : {}", self.corrupted)
    }
}
