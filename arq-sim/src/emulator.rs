//! Deterministic discrete-event network emulator.
//!
//! Drives one [`Sender`] (endpoint A) and one [`Receiver`] (endpoint B) over a
//! simulated link, one event at a time, in simulated time:
//!
//! | Event            | Effect                                              |
//! |------------------|-----------------------------------------------------|
//! | From application | A new message is generated and handed to A.         |
//! | From network     | A packet arrives at A or B.                         |
//! | Timer expiry     | A's retransmission timer fires.                     |
//!
//! The link applies a fault model per packet:
//!
//! | Fault       | Description                                               |
//! |-------------|-----------------------------------------------------------|
//! | Loss        | Drop the packet with probability `loss_prob`.             |
//! | Corruption  | With probability `corrupt_prob`, rewrite payload byte 0   |
//! |             | (75%), the sequence number (12.5%) or the ack number      |
//! |             | (12.5%).  The stored integrity value is left untouched.   |
//! | Delay       | 1–10 time units, never overtaking an earlier packet in    |
//! |             | the same direction.                                       |
//!
//! All randomness comes from one seeded [`StdRng`], so a run is fully
//! reproducible from its configuration.  One time unit is one millisecond of
//! [`Duration`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{check_duration, check_probability, ConfigError, ProtocolConfig};
use crate::context::{Context, Endpoint};
use crate::packet::{Message, Packet};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::stats::{LinkStats, ReceiverStats, SenderStats};

/// Value the link writes into a corrupted header field.
const CORRUPT_FIELD: u32 = 999_999;
/// Byte the link writes into a corrupted payload.
const CORRUPT_BYTE: u8 = b'Z';

const MIN_LINK_DELAY: Duration = Duration::from_millis(1);
const MAX_LINK_DELAY: Duration = Duration::from_millis(10);

/// Damage one packet field without touching its stored integrity value:
/// payload byte 0 (75%), the sequence number (12.5%) or the ack number
/// (12.5%).
pub fn corrupt(rng: &mut impl Rng, packet: &mut Packet) {
    let x = rng.random::<f64>();
    if x < 0.75 {
        packet.payload[0] = CORRUPT_BYTE;
    } else if x < 0.875 {
        packet.seq = CORRUPT_FIELD;
    } else {
        packet.ack = CORRUPT_FIELD;
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Workload and fault model for one emulator run.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Number of messages the application generates.
    pub messages: usize,
    /// Probability that a packet is lost.
    pub loss_prob: f64,
    /// Probability that a surviving packet is corrupted.
    pub corrupt_prob: f64,
    /// Mean time between two application messages.
    pub mean_interval: Duration,
    pub seed: u64,
    /// Events scheduled after this simulated time are not processed.
    pub max_time: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        // Lossless, corruption-free link.
        Self {
            messages: 100,
            loss_prob: 0.0,
            corrupt_prob: 0.0,
            mean_interval: Duration::from_millis(20),
            seed: 1234,
            max_time: Duration::from_secs(3600),
        }
    }
}

impl EmulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("loss probability", self.loss_prob)?;
        check_probability("corruption probability", self.corrupt_prob)?;
        if self.max_time.is_zero() {
            return Err(ConfigError::NonPositive("time limit"));
        }
        check_duration("time limit", self.max_time)?;
        check_duration("mean message interval", self.mean_interval)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum EventKind {
    FromApplication,
    FromNetwork { to: Endpoint, packet: Packet },
    TimerExpiry { endpoint: Endpoint, generation: u64 },
}

#[derive(Debug)]
struct Event {
    at: Duration,
    /// Insertion order; breaks ties between events at the same time.
    order: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.order == other.order
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so that BinaryHeap (a max-heap) pops the earliest event first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.order.cmp(&self.order))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of an emulator run.
#[derive(Debug, Clone)]
pub struct Report {
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    pub link: LinkStats,
    /// Messages the application generated.
    pub generated: usize,
    /// Messages A admitted into its window, in submission order.
    pub accepted: Vec<Message>,
    /// Messages B delivered, in delivery order.
    pub delivered: Vec<Message>,
    /// Simulated time of the last processed event.
    pub end_time: Duration,
    /// `true` when the run stopped at the time limit with events pending.
    pub truncated: bool,
}

impl Report {
    /// Every admitted message was delivered exactly once, in order.
    pub fn delivered_in_order(&self) -> bool {
        self.accepted == self.delivered
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation finished at t={:.3}", self.end_time.as_secs_f64() * 1000.0)?;
        if self.truncated {
            writeln!(f, "  (stopped at the time limit)")?;
        }
        writeln!(f, "Messages generated        : {}", self.generated)?;
        writeln!(f, "Sender (A):")?;
        writeln!(f, "{}", self.sender)?;
        writeln!(f, "Receiver (B):")?;
        writeln!(f, "{}", self.receiver)?;
        writeln!(f, "Link (both directions):")?;
        writeln!(f, "{}", self.link)?;
        writeln!(f, "  messages to application : {}", self.delivered.len())?;
        write!(
            f,
            "In-order exactly-once delivery: {}",
            if self.delivered_in_order() { "yes" } else { "NO" }
        )
    }
}

// ---------------------------------------------------------------------------
// Scheduler — everything the endpoints' contexts touch
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
struct TimerSlot {
    generation: u64,
    armed: Option<u64>,
}

#[derive(Debug)]
struct Scheduler {
    now: Duration,
    queue: BinaryHeap<Event>,
    next_order: u64,
    rng: StdRng,
    loss_prob: f64,
    corrupt_prob: f64,
    /// Latest scheduled arrival per destination, to keep each direction FIFO.
    last_arrival: [Duration; 2],
    timers: [TimerSlot; 2],
    link: LinkStats,
    delivered: Vec<Message>,
}

fn index(endpoint: Endpoint) -> usize {
    match endpoint {
        Endpoint::Sender => 0,
        Endpoint::Receiver => 1,
    }
}

impl Scheduler {
    fn push(&mut self, at: Duration, kind: EventKind) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Event { at, order, kind });
    }

    fn schedule_app_message(&mut self, mean: Duration) {
        let gap = mean.mul_f64(2.0 * self.rng.random::<f64>());
        self.push(self.now + gap, EventKind::FromApplication);
    }

    fn transmit(&mut self, from: Endpoint, mut packet: Packet) {
        self.link.to_network += 1;

        if self.rng.random_bool(self.loss_prob) {
            self.link.lost += 1;
            log::trace!("[link] {from}→{} packet lost", from.peer());
            return;
        }

        if self.rng.random_bool(self.corrupt_prob) {
            self.link.corrupted += 1;
            corrupt(&mut self.rng, &mut packet);
            log::trace!("[link] {from}→{} packet corrupted", from.peer());
        }

        let to = from.peer();
        let delay = self.rng.random_range(MIN_LINK_DELAY..=MAX_LINK_DELAY);
        let at = self.now.max(self.last_arrival[index(to)]) + delay;
        self.last_arrival[index(to)] = at;
        self.push(at, EventKind::FromNetwork { to, packet });
    }

    fn arm_timer(&mut self, endpoint: Endpoint, duration: Duration) {
        let slot = &mut self.timers[index(endpoint)];
        if slot.armed.is_some() {
            log::warn!("[link] {endpoint} armed a running timer; replacing it");
        }
        slot.generation += 1;
        slot.armed = Some(slot.generation);
        let generation = slot.generation;
        self.push(
            self.now + duration,
            EventKind::TimerExpiry {
                endpoint,
                generation,
            },
        );
    }

    fn cancel_timer(&mut self, endpoint: Endpoint) {
        self.timers[index(endpoint)].armed = None;
    }

    /// Consume a timer expiry.  Returns `false` for expiries that were
    /// cancelled or superseded.
    fn fire_timer(&mut self, endpoint: Endpoint, generation: u64) -> bool {
        let slot = &mut self.timers[index(endpoint)];
        if slot.armed == Some(generation) {
            slot.armed = None;
            true
        } else {
            false
        }
    }
}

/// [`Context`] handed to an endpoint while it processes one event.
struct EndpointContext<'a> {
    endpoint: Endpoint,
    sched: &'a mut Scheduler,
}

impl Context for EndpointContext<'_> {
    fn send_to_network(&mut self, packet: Packet) {
        self.sched.transmit(self.endpoint, packet);
    }

    fn deliver_to_application(&mut self, message: Message) {
        self.sched.delivered.push(message);
    }

    fn arm_timer(&mut self, duration: Duration) {
        self.sched.arm_timer(self.endpoint, duration);
    }

    fn cancel_timer(&mut self) {
        self.sched.cancel_timer(self.endpoint);
    }
}

// ---------------------------------------------------------------------------
// Emulator
// ---------------------------------------------------------------------------

/// A sender, a receiver and the simulated link between them.
#[derive(Debug)]
pub struct Emulator {
    config: EmulatorConfig,
    sender: Sender,
    receiver: Receiver,
    sched: Scheduler,
    generated: usize,
    accepted: Vec<Message>,
    truncated: bool,
}

impl Emulator {
    /// Build both endpoints from `protocol` and schedule the first message.
    pub fn new(protocol: &ProtocolConfig, config: EmulatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sender = Sender::new(protocol)?;
        let receiver = Receiver::new(protocol)?;

        let mut sched = Scheduler {
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            next_order: 0,
            rng: StdRng::seed_from_u64(config.seed),
            loss_prob: config.loss_prob,
            corrupt_prob: config.corrupt_prob,
            last_arrival: [Duration::ZERO; 2],
            timers: [TimerSlot::default(); 2],
            link: LinkStats::default(),
            delivered: Vec::new(),
        };
        if config.messages > 0 {
            sched.schedule_app_message(config.mean_interval);
        }

        Ok(Self {
            config,
            sender,
            receiver,
            sched,
            generated: 0,
            accepted: Vec::new(),
            truncated: false,
        })
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.sched.now
    }

    /// Process the next event.  Returns `false` once there is nothing left to
    /// do (queue empty or time limit reached).
    pub fn step(&mut self) -> bool {
        let Some(event) = self.sched.queue.pop() else {
            return false;
        };
        if event.at > self.config.max_time {
            self.sched.queue.push(event);
            self.truncated = true;
            return false;
        }
        self.sched.now = event.at;

        match event.kind {
            EventKind::FromApplication => self.generate_message(),
            EventKind::FromNetwork { to, packet } => {
                let mut ctx = EndpointContext {
                    endpoint: to,
                    sched: &mut self.sched,
                };
                match to {
                    Endpoint::Sender => self.sender.on_packet(&mut ctx, &packet),
                    Endpoint::Receiver => self.receiver.on_packet(&mut ctx, &packet),
                }
            }
            EventKind::TimerExpiry {
                endpoint,
                generation,
            } => {
                if !self.sched.fire_timer(endpoint, generation) {
                    return true;
                }
                match endpoint {
                    Endpoint::Sender => {
                        let mut ctx = EndpointContext {
                            endpoint,
                            sched: &mut self.sched,
                        };
                        self.sender.on_timeout(&mut ctx);
                    }
                    Endpoint::Receiver => log::warn!("[link] receiver timer fired; ignored"),
                }
            }
        }
        true
    }

    /// Run to completion and report.
    pub fn run(mut self) -> Report {
        while self.step() {}
        log::info!(
            "{} emulation done at t={:?}: {} generated, {} accepted, {} delivered",
            self.sender.policy(),
            self.sched.now,
            self.generated,
            self.accepted.len(),
            self.sched.delivered.len()
        );
        self.into_report()
    }

    pub fn into_report(self) -> Report {
        Report {
            sender: self.sender.stats().clone(),
            receiver: self.receiver.stats().clone(),
            link: self.sched.link,
            generated: self.generated,
            accepted: self.accepted,
            delivered: self.sched.delivered,
            end_time: self.sched.now,
            truncated: self.truncated,
        }
    }

    fn generate_message(&mut self) {
        let message = Message::filled(b'a' + (self.generated % 26) as u8);
        self.generated += 1;

        let mut ctx = EndpointContext {
            endpoint: Endpoint::Sender,
            sched: &mut self.sched,
        };
        if self.sender.submit(&mut ctx, message) {
            self.accepted.push(message);
        }

        if self.generated < self.config.messages {
            self.sched.schedule_app_message(self.config.mean_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(at_ms: u64, order: u64) -> Event {
        Event {
            at: Duration::from_millis(at_ms),
            order,
            kind: EventKind::FromApplication,
        }
    }

    #[test]
    fn queue_pops_earliest_first() {
        let mut heap = BinaryHeap::new();
        heap.push(event(5, 0));
        heap.push(event(1, 1));
        heap.push(event(3, 2));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|e| e.at.as_millis() as u64).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn ties_resolve_in_insertion_order() {
        let mut heap = BinaryHeap::new();
        heap.push(event(2, 7));
        heap.push(event(2, 3));
        heap.push(event(2, 5));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|e| e.order).collect();
        assert_eq!(order, vec![3, 5, 7]);
    }

    #[test]
    fn invalid_probabilities_rejected() {
        let cfg = EmulatorConfig {
            loss_prob: 1.5,
            ..EmulatorConfig::default()
        };
        assert!(matches!(
            Emulator::new(&ProtocolConfig::default(), cfg),
            Err(ConfigError::InvalidProbability { .. })
        ));
    }

    #[test]
    fn oversized_durations_rejected() {
        let long_interval = EmulatorConfig {
            mean_interval: Duration::MAX,
            ..EmulatorConfig::default()
        };
        assert!(matches!(
            Emulator::new(&ProtocolConfig::default(), long_interval),
            Err(ConfigError::TooLarge { name: "mean message interval", .. })
        ));

        let long_run = EmulatorConfig {
            max_time: Duration::from_secs(u64::MAX),
            ..EmulatorConfig::default()
        };
        assert!(matches!(
            Emulator::new(&ProtocolConfig::default(), long_run),
            Err(ConfigError::TooLarge { name: "time limit", .. })
        ));
    }

    #[test]
    fn run_at_the_duration_bounds_finishes() {
        let cfg = EmulatorConfig {
            messages: 3,
            mean_interval: crate::config::MAX_DURATION,
            max_time: crate::config::MAX_DURATION,
            ..EmulatorConfig::default()
        };
        let report = Emulator::new(&ProtocolConfig::default(), cfg).unwrap().run();
        assert!(report.delivered.len() <= 3);
        assert!(report.accepted.starts_with(&report.delivered));
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let mut emu = Emulator::new(&ProtocolConfig::default(), EmulatorConfig::default()).unwrap();
        emu.sched.arm_timer(Endpoint::Sender, Duration::from_millis(5));
        emu.sched.cancel_timer(Endpoint::Sender);
        assert!(!emu.sched.fire_timer(Endpoint::Sender, 1));
    }

    #[test]
    fn rearmed_timer_supersedes_previous() {
        let mut emu = Emulator::new(&ProtocolConfig::default(), EmulatorConfig::default()).unwrap();
        emu.sched.arm_timer(Endpoint::Sender, Duration::from_millis(5));
        emu.sched.arm_timer(Endpoint::Sender, Duration::from_millis(5));
        assert!(!emu.sched.fire_timer(Endpoint::Sender, 1));
        assert!(emu.sched.fire_timer(Endpoint::Sender, 2));
        assert!(!emu.sched.fire_timer(Endpoint::Sender, 2), "fires once per arming");
    }

    #[test]
    fn link_preserves_order_per_direction() {
        let mut emu = Emulator::new(&ProtocolConfig::default(), EmulatorConfig::default()).unwrap();
        emu.sched.queue.clear();
        for seq in 0..20 {
            emu.sched
                .transmit(Endpoint::Sender, Packet::data(seq, &Message::filled(b'q')));
        }
        let mut seqs = Vec::new();
        while let Some(ev) = emu.sched.queue.pop() {
            if let EventKind::FromNetwork { packet, .. } = ev.kind {
                seqs.push(packet.seq);
            }
        }
        assert_eq!(seqs, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn corruption_is_detected() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut packet = Packet::data(3, &Message::filled(b'k'));
            corrupt(&mut rng, &mut packet);
            assert!(crate::integrity::is_corrupted(&packet));
        }
    }

    #[test]
    fn zero_messages_is_an_empty_run() {
        let cfg = EmulatorConfig {
            messages: 0,
            ..EmulatorConfig::default()
        };
        let report = Emulator::new(&ProtocolConfig::default(), cfg).unwrap().run();
        assert_eq!(report.generated, 0);
        assert!(report.delivered.is_empty());
        assert!(report.delivered_in_order());
    }
}
