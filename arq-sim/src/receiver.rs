//! Receive-side sliding-window state machine.
//!
//! [`Receiver`] owns the reception window `[expected, expected + W - 1]` and
//! reacts to a single event, [`Receiver::on_packet`].
//!
//! - Corrupted arrivals are discarded without an acknowledgment; the sender
//!   recovers by timeout.
//! - **Selective** policy: every intact arrival is acknowledged with its own
//!   sequence number, in window or not, new or duplicate.  In-window packets
//!   are buffered by their offset from `expected`; when the packet at
//!   `expected` lands, the contiguous run of buffered packets is delivered and
//!   the window slides past it.
//! - **Cumulative** policy: only the packet at `expected` is accepted and
//!   delivered at once; everything else is discarded.  Every intact arrival is
//!   answered with an ACK for the last in-order sequence number
//!   (`expected - 1`), which the sender reads as covering all earlier
//!   packets.
//!
//! ```text
//!  expected
//!     │  slot 0   slot 1   slot 2   slot 3
//!  ───┼────────┬────────┬────────┬────────┬──▶ seq space (mod N)
//!     │  empty │  msg   │  empty │  msg   │
//!     └─ delivery resumes here once slot 0 fills
//! ```

use std::collections::VecDeque;

use crate::config::{AckPolicy, ConfigError, ProtocolConfig};
use crate::context::Context;
use crate::integrity::is_corrupted;
use crate::packet::{Message, Packet};
use crate::seq_space::SeqSpace;
use crate::stats::ReceiverStats;

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Sliding-window receive-side state for one session.
#[derive(Debug)]
pub struct Receiver {
    space: SeqSpace,
    policy: AckPolicy,
    window_size: usize,

    /// Next sequence number owed to the application.
    ///
    /// Advances only past slots that have been delivered.
    expected: u32,

    /// Out-of-order payloads; slot `i` holds sequence number `expected + i`.
    /// Always `window_size` long under the selective policy, unused under the
    /// cumulative one.
    buffer: VecDeque<Option<Message>>,

    stats: ReceiverStats,
}

impl Receiver {
    /// Create a receiver from a validated configuration.  The first expected
    /// sequence number is 0.
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let buffer = match config.policy {
            AckPolicy::Selective => std::iter::repeat(None).take(config.window_size).collect(),
            AckPolicy::Cumulative => VecDeque::new(),
        };
        Ok(Self {
            space: SeqSpace::new(config.seq_space_size),
            policy: config.policy,
            window_size: config.window_size,
            expected: 0,
            buffer,
            stats: ReceiverStats::default(),
        })
    }

    pub fn policy(&self) -> AckPolicy {
        self.policy
    }

    /// Next sequence number owed to the application.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Number of out-of-order payloads waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.buffer.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Process a data packet arriving from the link.
    pub fn on_packet(&mut self, ctx: &mut impl Context, packet: &Packet) {
        if is_corrupted(packet) {
            self.stats.corrupted_packets += 1;
            log::debug!("[receiver] ← corrupted packet dropped, no ACK");
            return;
        }
        self.stats.packets_received += 1;

        match self.policy {
            AckPolicy::Selective => self.on_selective(ctx, packet),
            AckPolicy::Cumulative => self.on_cumulative(ctx, packet),
        }
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    fn on_selective(&mut self, ctx: &mut impl Context, packet: &Packet) {
        self.send_ack(ctx, packet.seq);

        let Some(slot) = self.space.slot(packet.seq, self.expected, self.window_size) else {
            self.stats.duplicates += 1;
            log::debug!(
                "[receiver] ← DATA seq={} outside window starting at {}, re-ACKed only",
                packet.seq,
                self.expected
            );
            return;
        };

        let entry = &mut self.buffer[slot.get()];
        if entry.is_some() {
            self.stats.duplicates += 1;
            log::debug!("[receiver] ← DATA seq={} already buffered", packet.seq);
            return;
        }
        *entry = Some(packet.message());
        log::debug!("[receiver] ← DATA seq={} buffered in slot {}", packet.seq, slot.get());

        if slot.get() == 0 {
            self.deliver_contiguous(ctx);
        }
    }

    fn on_cumulative(&mut self, ctx: &mut impl Context, packet: &Packet) {
        if packet.seq == self.expected {
            self.deliver(ctx, packet.message());
        } else {
            self.stats.duplicates += 1;
            log::debug!(
                "[receiver] ← DATA seq={} not the expected {}, discarded",
                packet.seq,
                self.expected
            );
        }
        self.send_ack(ctx, self.last_in_order());
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Deliver every buffered payload from slot 0 up to the first gap.
    fn deliver_contiguous(&mut self, ctx: &mut impl Context) {
        while let Some(Some(message)) = self.buffer.front().copied() {
            self.buffer.pop_front();
            self.buffer.push_back(None);
            self.deliver(ctx, message);
        }
    }

    fn deliver(&mut self, ctx: &mut impl Context, message: Message) {
        log::debug!("[receiver] → deliver seq={}", self.expected);
        ctx.deliver_to_application(message);
        self.stats.messages_delivered += 1;
        self.expected = self.space.next(self.expected);
    }

    /// Sequence number of the most recent in-order delivery.  Before the
    /// first delivery this is `N - 1`, which no sender window contains.
    fn last_in_order(&self) -> u32 {
        self.space.prev(self.expected)
    }

    fn send_ack(&mut self, ctx: &mut impl Context, ack: u32) {
        log::debug!("[receiver] → ACK {}", ack);
        ctx.send_to_network(Packet::ack(ack));
        self.stats.acks_sent += 1;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::context::recording::RecordingContext;
    use crate::packet::NOT_IN_USE;

    fn msg(i: u8) -> Message {
        Message::filled(b'a' + i)
    }

    fn data(seq: u32) -> Packet {
        Packet::data(seq, &msg(seq as u8))
    }

    fn receiver(window_size: usize, seq_space_size: u32, policy: AckPolicy) -> Receiver {
        Receiver::new(&ProtocolConfig {
            window_size,
            seq_space_size,
            rto: Duration::from_millis(16),
            policy,
        })
        .unwrap()
    }

    #[test]
    fn initial_state() {
        let r = receiver(4, 8, AckPolicy::Selective);
        assert_eq!(r.policy(), AckPolicy::Selective);
        assert_eq!(receiver(3, 8, AckPolicy::Cumulative).policy(), AckPolicy::Cumulative);
        assert_eq!(r.expected(), 0);
        assert_eq!(r.buffered(), 0);
    }

    // -- selective ---------------------------------------------------------

    #[test]
    fn in_order_packet_delivered_and_acked() {
        let mut r = receiver(4, 8, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();

        r.on_packet(&mut ctx, &data(0));

        assert_eq!(ctx.delivered, vec![msg(0)]);
        assert_eq!(ctx.sent_acks(), vec![0]);
        assert_eq!(ctx.sent[0].seq, NOT_IN_USE);
        assert_eq!(r.expected(), 1);
        assert_eq!(r.stats().packets_received, 1);
    }

    #[test]
    fn out_of_order_buffered_then_drained() {
        let mut r = receiver(4, 8, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();

        r.on_packet(&mut ctx, &data(2));
        r.on_packet(&mut ctx, &data(1));
        assert!(ctx.delivered.is_empty());
        assert_eq!(r.buffered(), 2);
        assert_eq!(ctx.sent_acks(), vec![2, 1]);

        r.on_packet(&mut ctx, &data(0));
        assert_eq!(ctx.delivered, vec![msg(0), msg(1), msg(2)]);
        assert_eq!(r.expected(), 3);
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn gap_stops_delivery() {
        let mut r = receiver(4, 8, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();

        r.on_packet(&mut ctx, &data(3));
        r.on_packet(&mut ctx, &data(0));
        assert_eq!(ctx.delivered, vec![msg(0)]);
        assert_eq!(r.expected(), 1);
        assert_eq!(r.buffered(), 1);

        r.on_packet(&mut ctx, &data(2));
        r.on_packet(&mut ctx, &data(1));
        assert_eq!(ctx.delivered, vec![msg(0), msg(1), msg(2), msg(3)]);
        assert_eq!(r.expected(), 4);
    }

    #[test]
    fn duplicate_below_window_reacked_not_redelivered() {
        let mut r = receiver(4, 8, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();
        r.on_packet(&mut ctx, &data(0));
        ctx.clear();

        r.on_packet(&mut ctx, &data(0));

        assert!(ctx.delivered.is_empty());
        assert_eq!(ctx.sent_acks(), vec![0]);
        assert_eq!(r.expected(), 1);
        assert_eq!(r.stats().duplicates, 1);
    }

    #[test]
    fn duplicate_in_window_not_rebuffered() {
        let mut r = receiver(4, 8, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();
        r.on_packet(&mut ctx, &data(2));
        r.on_packet(&mut ctx, &data(2));

        assert_eq!(r.buffered(), 1);
        assert_eq!(ctx.sent_acks(), vec![2, 2]);
        assert_eq!(r.stats().duplicates, 1);
    }

    #[test]
    fn above_window_acked_not_buffered() {
        let mut r = receiver(4, 8, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();
        r.on_packet(&mut ctx, &data(5));

        assert_eq!(r.buffered(), 0);
        assert_eq!(ctx.sent_acks(), vec![5]);
    }

    #[test]
    fn payload_corruption_gets_no_ack() {
        let mut r = receiver(6, 12, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();
        let mut pkt = data(0);
        pkt.payload[7] = b'Z';

        r.on_packet(&mut ctx, &pkt);

        assert!(ctx.sent.is_empty());
        assert!(ctx.delivered.is_empty());
        assert_eq!(r.expected(), 0);
        assert_eq!(r.stats().corrupted_packets, 1);
        assert_eq!(r.stats().packets_received, 0);
    }

    #[test]
    fn selective_window_wraps() {
        let mut r = receiver(2, 4, AckPolicy::Selective);
        let mut ctx = RecordingContext::new();
        for seq in [0, 1, 3, 2, 0] {
            r.on_packet(&mut ctx, &data(seq));
        }
        assert_eq!(ctx.delivered, vec![msg(0), msg(1), msg(2), msg(3), msg(0)]);
        assert_eq!(r.expected(), 1);
    }

    // -- cumulative --------------------------------------------------------

    #[test]
    fn cumulative_accepts_only_expected() {
        let mut r = receiver(3, 8, AckPolicy::Cumulative);
        let mut ctx = RecordingContext::new();

        r.on_packet(&mut ctx, &data(1));
        assert!(ctx.delivered.is_empty());
        assert_eq!(ctx.sent_acks(), vec![7], "nothing in order yet");

        r.on_packet(&mut ctx, &data(0));
        r.on_packet(&mut ctx, &data(1));
        assert_eq!(ctx.delivered, vec![msg(0), msg(1)]);
        assert_eq!(ctx.sent_acks(), vec![7, 0, 1]);
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn cumulative_duplicate_reacks_last_in_order() {
        let mut r = receiver(3, 8, AckPolicy::Cumulative);
        let mut ctx = RecordingContext::new();
        r.on_packet(&mut ctx, &data(0));
        r.on_packet(&mut ctx, &data(1));
        ctx.clear();

        r.on_packet(&mut ctx, &data(0));
        assert!(ctx.delivered.is_empty());
        assert_eq!(ctx.sent_acks(), vec![1]);
        assert_eq!(r.stats().duplicates, 1);
    }

    #[test]
    fn cumulative_corruption_gets_no_ack() {
        let mut r = receiver(3, 8, AckPolicy::Cumulative);
        let mut ctx = RecordingContext::new();
        let mut pkt = data(0);
        pkt.seq = 999_999;

        r.on_packet(&mut ctx, &pkt);
        assert!(ctx.sent.is_empty());
    }
}
