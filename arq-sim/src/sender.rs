//! Send-side sliding-window state machine.
//!
//! [`Sender`] owns the transmission window: the packets sent but not yet slid
//! past, a per-slot acknowledged flag, and the single retransmission timer.
//! It reacts to three events, each processed to completion:
//!
//! - [`Sender::submit`] — the application hands over a message;
//! - [`Sender::on_packet`] — an acknowledgment arrives from the link;
//! - [`Sender::on_timeout`] — the retransmission timer fires.
//!
//! # Window layout
//!
//! ```text
//!    base                      next_seq
//!     │                           │
//!  ───┼───┬───┬───┬───┬───┬───────┼──────────▶ seq space (mod N)
//!     │ 0 │ 1 │ 2 │ 3 │ 4 │       │
//!     │ <── sent, not slid past ─▶│ <── sendable while len < window_size
//! ```
//!
//! Slot `i` of the window holds sequence number `base + i`.  Slots are looked
//! up through [`SeqSpace::slot`] only.
//!
//! # Acknowledgment policies
//!
//! - **Cumulative** (Go-Back-N): an ACK for `s` marks every slot up to and
//!   including `s`; the window slides past all of them.  A timeout resends
//!   every unacknowledged packet.
//! - **Selective** (Selective Repeat): an ACK for `s` marks slot `s` only; the
//!   window slides when the base slot is acknowledged, past every contiguous
//!   acknowledged slot.  A timeout resends only the oldest unacknowledged
//!   packet.
//!
//! Nothing here is surfaced to the caller as an error: a full window drops
//! the message and bumps [`SenderStats::window_full`], corrupted and stale
//! ACKs are ignored.

use std::collections::VecDeque;

use crate::config::{AckPolicy, ConfigError, ProtocolConfig};
use crate::context::Context;
use crate::integrity::is_corrupted;
use crate::packet::{Message, Packet};
use crate::seq_space::SeqSpace;
use crate::stats::SenderStats;
use crate::timer::RetransmitTimer;

// ---------------------------------------------------------------------------
// SentEntry
// ---------------------------------------------------------------------------

/// One occupied slot of the transmission window.
#[derive(Debug, Clone)]
pub struct SentEntry {
    /// The packet exactly as first transmitted.
    pub packet: Packet,
    /// Set once an acknowledgment covering this slot arrives.
    pub acked: bool,
    /// Total number of times this packet has been transmitted.
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Sliding-window send-side state for one session.
#[derive(Debug)]
pub struct Sender {
    space: SeqSpace,
    policy: AckPolicy,
    window_size: usize,

    /// Sequence number of the oldest slot (left window edge).
    base: u32,

    /// Sequence number for the next new packet.
    next_seq: u32,

    /// Occupied slots ordered by sequence number (front = `base`).
    window: VecDeque<SentEntry>,

    timer: RetransmitTimer,
    stats: SenderStats,
}

impl Sender {
    /// Create a sender from a validated configuration.  Sequence numbers
    /// start at 0.
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            space: SeqSpace::new(config.seq_space_size),
            policy: config.policy,
            window_size: config.window_size,
            base: 0,
            next_seq: 0,
            window: VecDeque::with_capacity(config.window_size),
            timer: RetransmitTimer::new(config.rto),
            stats: SenderStats::default(),
        })
    }

    pub fn policy(&self) -> AckPolicy {
        self.policy
    }

    /// Sequence number of the oldest slot in the window.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Sequence number the next accepted message will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// `true` when one more message can be admitted.
    pub fn can_send(&self) -> bool {
        self.window.len() < self.window_size
    }

    /// Number of sent packets still awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.window.iter().filter(|e| !e.acked).count()
    }

    /// `true` while the retransmission timer is armed.
    pub fn is_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Occupied window slots from oldest to newest.
    pub fn window_entries(&self) -> impl Iterator<Item = &SentEntry> {
        self.window.iter()
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Admit `message` into the window and transmit it.
    ///
    /// Returns `false` (and drops the message) when the window is full.  The
    /// application decides whether to try again later.
    pub fn submit(&mut self, ctx: &mut impl Context, message: Message) -> bool {
        if !self.can_send() {
            self.stats.window_full += 1;
            log::debug!(
                "[sender] window full ({} / {}), message dropped",
                self.window.len(),
                self.window_size
            );
            return false;
        }

        let packet = Packet::data(self.next_seq, &message);
        log::debug!("[sender] → DATA seq={}", packet.seq);
        ctx.send_to_network(packet.clone());
        self.window.push_back(SentEntry {
            packet,
            acked: false,
            tx_count: 1,
        });
        self.stats.messages_accepted += 1;
        self.stats.packets_sent += 1;

        if self.in_flight() == 1 {
            self.timer.start(ctx);
        }
        self.next_seq = self.space.next(self.next_seq);
        true
    }

    /// Process a packet arriving from the link (always an acknowledgment;
    /// the receiver never originates data).
    pub fn on_packet(&mut self, ctx: &mut impl Context, packet: &Packet) {
        if is_corrupted(packet) {
            self.stats.corrupted_acks += 1;
            log::debug!("[sender] ← corrupted ACK ignored");
            return;
        }
        self.stats.acks_received += 1;

        let Some(slot) = self.space.slot(packet.ack, self.base, self.window.len()) else {
            log::debug!(
                "[sender] ← ACK {} outside window [{}, {}), ignored",
                packet.ack,
                self.base,
                self.next_seq
            );
            return;
        };

        if self.window[slot.get()].acked {
            log::debug!("[sender] ← duplicate ACK {}", packet.ack);
            return;
        }
        self.stats.new_acks += 1;

        match self.policy {
            AckPolicy::Cumulative => {
                for entry in self.window.iter_mut().take(slot.get() + 1) {
                    entry.acked = true;
                }
                let slid = self.slide();
                log::debug!("[sender] ← ACK {} (slid {} slot(s))", packet.ack, slid);
                self.rearm(ctx);
            }
            AckPolicy::Selective => {
                self.window[slot.get()].acked = true;
                if slot.get() == 0 {
                    let slid = self.slide();
                    log::debug!("[sender] ← ACK {} (slid {} slot(s))", packet.ack, slid);
                    self.rearm(ctx);
                } else {
                    log::debug!("[sender] ← ACK {} buffered above base {}", packet.ack, self.base);
                }
            }
        }
    }

    /// Handle expiry of the retransmission timer.
    ///
    /// Cumulative policy resends every unacknowledged packet in window order;
    /// selective policy resends only the oldest one.  The timer is rearmed
    /// while packets remain in flight.
    pub fn on_timeout(&mut self, ctx: &mut impl Context) {
        self.timer.expired();

        if self.in_flight() == 0 {
            log::warn!("[sender] timer fired with nothing in flight");
            return;
        }

        let mut resent = 0u64;
        match self.policy {
            AckPolicy::Cumulative => {
                for entry in self.window.iter_mut().filter(|e| !e.acked) {
                    entry.tx_count += 1;
                    ctx.send_to_network(entry.packet.clone());
                    resent += 1;
                }
            }
            AckPolicy::Selective => {
                if let Some(entry) = self.window.iter_mut().find(|e| !e.acked) {
                    entry.tx_count += 1;
                    ctx.send_to_network(entry.packet.clone());
                    resent += 1;
                }
            }
        }
        self.stats.packets_resent += resent;
        log::debug!("[sender] timeout — resent {} packet(s) from base {}", resent, self.base);

        self.timer.start(ctx);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Drop every contiguous acknowledged slot at the front of the window and
    /// advance `base` past them.  Returns the number of slots removed.
    fn slide(&mut self) -> usize {
        let mut slid = 0;
        while self.window.front().is_some_and(|e| e.acked) {
            self.window.pop_front();
            self.base = self.space.next(self.base);
            slid += 1;
        }
        slid
    }

    /// Restart the timer while packets remain in flight, stop it otherwise.
    fn rearm(&mut self, ctx: &mut impl Context) {
        if self.in_flight() > 0 {
            self.timer.start(ctx);
        } else {
            self.timer.stop(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
