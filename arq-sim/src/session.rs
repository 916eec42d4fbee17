//! Async runtime: each endpoint runs as its own tokio task.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ submit(msg)                                   recv() ▲
//!      ▼                                                      │
//!  ┌─────────────┐   datagrams   ┌──────────┐   datagrams  ┌──┴──────────┐
//!  │ sender task │──────────────▶│ link A→B │─────────────▶│receiver task│
//!  │  (Sender)   │               └──────────┘              │ (Receiver)  │
//!  │             │   datagrams   ┌──────────┐   datagrams  │             │
//!  │             │◀──────────────│ link B→A │◀─────────────│             │
//!  └─────────────┘               └──────────┘              └─────────────┘
//! ```
//!
//! Every task owns its state exclusively and handles one event at a time
//! from its mailboxes, so the engines never need locks.  The sender task
//! multiplexes application commands, inbound ACKs and its retransmission
//! timer with `tokio::select!`.  Link tasks delay each datagram by a fixed
//! latency, preserve order and apply seeded loss and corruption.
//!
//! ```ignore
//! let mut session = Session::spawn(&ProtocolConfig::default(), LinkConfig::default())?;
//! session.submit(Message::filled(b'a')).await?;
//! let delivered = session.recv().await;
//! let stats = session.close().await?;
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

use crate::config::{check_duration, check_probability, ConfigError, ProtocolConfig};
use crate::context::{Context, Endpoint};
use crate::emulator::corrupt;
use crate::packet::{Message, Packet};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::stats::{LinkStats, ReceiverStats, SenderStats};

/// Capacity of the application → sender command mailbox.
const COMMAND_QUEUE: usize = 64;

/// A parked timer sleeps this long; the `timer_armed` guard keeps it from
/// being acted on.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    /// The sender task is gone; no more submissions are possible.
    #[error("session is closed")]
    Closed,
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// Link configuration
// ---------------------------------------------------------------------------

/// Behaviour of both link directions.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub loss_prob: f64,
    pub corrupt_prob: f64,
    /// One-way delay applied to every datagram.
    pub latency: Duration,
    /// Seed for the A→B direction; B→A uses `seed + 1`.
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            loss_prob: 0.0,
            corrupt_prob: 0.0,
            latency: Duration::from_millis(5),
            seed: 1234,
        }
    }
}

impl LinkConfig {
    /// A link that never delivers an intact datagram could never drain on
    /// close, so at least one of loss and corruption must stay below 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("loss probability", self.loss_prob)?;
        check_probability("corruption probability", self.corrupt_prob)?;
        for (name, value) in [
            ("loss probability", self.loss_prob),
            ("corruption probability", self.corrupt_prob),
        ] {
            if value >= 1.0 {
                return Err(ConfigError::InvalidProbability { name, value });
            }
        }
        check_duration("link latency", self.latency)
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

enum Command {
    Submit {
        message: Message,
        reply: oneshot::Sender<bool>,
    },
}

/// Counters collected from every task when a session closes.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    /// A→B direction.
    pub forward: LinkStats,
    /// B→A direction.
    pub reverse: LinkStats,
    /// Messages delivered at B that were never read through [`Session::recv`].
    pub unread: Vec<Message>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sender (A):")?;
        writeln!(f, "{}", self.sender)?;
        writeln!(f, "Receiver (B):")?;
        writeln!(f, "{}", self.receiver)?;
        writeln!(f, "Link A→B:")?;
        writeln!(f, "{}", self.forward)?;
        writeln!(f, "Link B→A:")?;
        write!(f, "{}", self.reverse)
    }
}

/// Handle to a running sender/receiver pair.
pub struct Session {
    commands: mpsc::Sender<Command>,
    delivered: mpsc::UnboundedReceiver<Message>,
    sender: JoinHandle<SenderStats>,
    receiver: JoinHandle<ReceiverStats>,
    forward: JoinHandle<LinkStats>,
    reverse: JoinHandle<LinkStats>,
}

impl Session {
    /// Start all four tasks.  Must be called from within a tokio runtime.
    pub fn spawn(config: &ProtocolConfig, link: LinkConfig) -> Result<Self, ConfigError> {
        link.validate()?;
        let sender = Sender::new(config)?;
        let receiver = Receiver::new(config)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let (a_out, fwd_in) = mpsc::unbounded_channel();
        let (fwd_out, b_in) = mpsc::unbounded_channel();
        let (b_out, rev_in) = mpsc::unbounded_channel();
        let (rev_out, a_in) = mpsc::unbounded_channel();

        let forward_rng = StdRng::seed_from_u64(link.seed);
        let reverse_rng = StdRng::seed_from_u64(link.seed.wrapping_add(1));

        Ok(Self {
            commands: cmd_tx,
            delivered: app_rx,
            sender: tokio::spawn(sender_loop(sender, cmd_rx, a_in, a_out)),
            receiver: tokio::spawn(receiver_loop(receiver, b_in, b_out, app_tx)),
            forward: tokio::spawn(link_loop(
                Endpoint::Sender,
                link.clone(),
                forward_rng,
                fwd_in,
                fwd_out,
            )),
            reverse: tokio::spawn(link_loop(
                Endpoint::Receiver,
                link,
                reverse_rng,
                rev_in,
                rev_out,
            )),
        })
    }

    /// Offer one message to the sender.  `Ok(false)` means the window was
    /// full and the message was dropped; the caller may retry later.
    pub async fn submit(&self, message: Message) -> Result<bool, SessionError> {
        let (reply, accepted) = oneshot::channel();
        self.commands
            .send(Command::Submit { message, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        accepted.await.map_err(|_| SessionError::Closed)
    }

    /// Next message delivered at the receiver.  Waits while nothing is
    /// pending; deliveries not read before [`Session::close`] are returned in
    /// [`SessionStats::unread`].  `None` only if the receiver task died.
    pub async fn recv(&mut self) -> Option<Message> {
        self.delivered.recv().await
    }

    /// Stop accepting submissions, wait until every accepted message has
    /// been acknowledged and the links have drained, then collect counters.
    pub async fn close(self) -> Result<SessionStats, SessionError> {
        let Session {
            commands,
            mut delivered,
            sender,
            receiver,
            forward,
            reverse,
        } = self;
        // The sender task treats a closed mailbox as end of input.
        drop(commands);

        let sender = sender.await?;
        let forward = forward.await?;
        let receiver = receiver.await?;
        let reverse = reverse.await?;

        let mut unread = Vec::new();
        while let Ok(message) = delivered.try_recv() {
            unread.push(message);
        }
        log::info!(
            "session closed: {} accepted, {} delivered",
            sender.messages_accepted,
            receiver.messages_delivered
        );
        Ok(SessionStats {
            sender,
            receiver,
            forward,
            reverse,
            unread,
        })
    }
}

// ---------------------------------------------------------------------------
// Task context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum TimerCommand {
    Arm(Duration),
    Cancel,
}

/// [`Context`] for one event handled inside a task.  Network sends go out
/// immediately; the last timer request is applied once the handler returns.
struct TaskContext<'a> {
    endpoint: Endpoint,
    network: &'a mpsc::UnboundedSender<Vec<u8>>,
    application: Option<&'a mpsc::UnboundedSender<Message>>,
    timer: Option<TimerCommand>,
}

impl<'a> TaskContext<'a> {
    fn new(
        endpoint: Endpoint,
        network: &'a mpsc::UnboundedSender<Vec<u8>>,
        application: Option<&'a mpsc::UnboundedSender<Message>>,
    ) -> Self {
        Self {
            endpoint,
            network,
            application,
            timer: None,
        }
    }
}

impl Context for TaskContext<'_> {
    fn send_to_network(&mut self, packet: Packet) {
        // A closed link means shutdown is under way.
        let _ = self.network.send(packet.encode());
    }

    fn deliver_to_application(&mut self, message: Message) {
        match self.application {
            Some(app) => {
                let _ = app.send(message);
            }
            None => log::warn!("[{}] has no application to deliver to", self.endpoint),
        }
    }

    fn arm_timer(&mut self, duration: Duration) {
        self.timer = Some(TimerCommand::Arm(duration));
    }

    fn cancel_timer(&mut self) {
        self.timer = Some(TimerCommand::Cancel);
    }
}

fn apply_timer(command: Option<TimerCommand>, timer: Pin<&mut Sleep>, armed: &mut bool) {
    match command {
        Some(TimerCommand::Arm(rto)) => {
            timer.reset(Instant::now() + rto);
            *armed = true;
        }
        Some(TimerCommand::Cancel) => {
            timer.reset(Instant::now() + FAR_FUTURE);
            *armed = false;
        }
        None => {}
    }
}

// ---------------------------------------------------------------------------
// Endpoint tasks
// ---------------------------------------------------------------------------

async fn sender_loop(
    mut sender: Sender,
    mut commands: mpsc::Receiver<Command>,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) -> SenderStats {
    let timer = tokio::time::sleep(FAR_FUTURE);
    tokio::pin!(timer);
    let mut timer_armed = false;
    let mut closing = false;

    loop {
        if closing && sender.in_flight() == 0 {
            break;
        }
        let mut ctx = TaskContext::new(Endpoint::Sender, &outbound, None);

        tokio::select! {
            // ── application submissions ──────────────────────────────────
            command = commands.recv(), if !closing => match command {
                Some(Command::Submit { message, reply }) => {
                    let accepted = sender.submit(&mut ctx, message);
                    let _ = reply.send(accepted);
                }
                None => {
                    closing = true;
                    log::debug!("[sender] input closed; draining {} in flight", sender.in_flight());
                }
            },

            // ── ACKs from the link ───────────────────────────────────────
            datagram = inbound.recv() => match datagram {
                Some(bytes) => match Packet::decode(&bytes) {
                    Ok(packet) => sender.on_packet(&mut ctx, &packet),
                    Err(e) => log::debug!("[sender] dropping datagram: {e}"),
                },
                None => break,
            },

            // ── retransmission timeout ───────────────────────────────────
            _ = &mut timer, if timer_armed => {
                timer_armed = false;
                sender.on_timeout(&mut ctx);
            }
        }

        apply_timer(ctx.timer, timer.as_mut(), &mut timer_armed);
    }

    log::debug!("[sender] task done");
    sender.stats().clone()
}

async fn receiver_loop(
    mut receiver: Receiver,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    application: mpsc::UnboundedSender<Message>,
) -> ReceiverStats {
    while let Some(bytes) = inbound.recv().await {
        let mut ctx = TaskContext::new(Endpoint::Receiver, &outbound, Some(&application));
        match Packet::decode(&bytes) {
            Ok(packet) => receiver.on_packet(&mut ctx, &packet),
            Err(e) => log::debug!("[receiver] dropping datagram: {e}"),
        }
        if ctx.timer.is_some() {
            log::warn!("[receiver] timer request ignored");
        }
    }

    log::debug!("[receiver] task done");
    receiver.stats().clone()
}

// ---------------------------------------------------------------------------
// Link task
// ---------------------------------------------------------------------------

/// Carry datagrams from `from` to its peer until the input closes and the
/// queue drains.
async fn link_loop(
    from: Endpoint,
    config: LinkConfig,
    mut rng: StdRng,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) -> LinkStats {
    let to = from.peer();
    let mut stats = LinkStats::default();
    let mut queue: VecDeque<(Instant, Vec<u8>)> = VecDeque::new();
    let mut open = true;

    loop {
        let next_due = queue.front().map(|(at, _)| *at);
        if !open && next_due.is_none() {
            break;
        }
        let wake = next_due.unwrap_or_else(|| Instant::now() + FAR_FUTURE);

        tokio::select! {
            datagram = inbound.recv(), if open => match datagram {
                Some(mut bytes) => {
                    stats.to_network += 1;
                    if rng.random_bool(config.loss_prob) {
                        stats.lost += 1;
                        log::trace!("[link] {from}→{to} datagram lost");
                        continue;
                    }
                    if rng.random_bool(config.corrupt_prob) {
                        if let Ok(mut packet) = Packet::decode(&bytes) {
                            corrupt(&mut rng, &mut packet);
                            bytes = packet.encode();
                            stats.corrupted += 1;
                            log::trace!("[link] {from}→{to} datagram corrupted");
                        }
                    }
                    queue.push_back((Instant::now() + config.latency, bytes));
                }
                None => open = false,
            },

            _ = tokio::time::sleep_until(wake), if next_due.is_some() => {
                if let Some((_, bytes)) = queue.pop_front() {
                    if outbound.send(bytes).is_err() {
                        // Far end is gone.
                        break;
                    }
                }
            }
        }
    }

    stats
}
