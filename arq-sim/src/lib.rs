//! `arq-sim` — sliding-window reliable delivery (Go-Back-N and Selective
//! Repeat) over a lossy, corrupting link.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   data packets   ┌──────────┐
//!  │  Sender  │─────────────────▶│ Receiver │
//!  │ (end A)  │                  │ (end B)  │
//!  └────┬─────┘        ACKs      └─────┬────┘
//!       │◀─────────────────────────────┘
//!       │
//!  ┌────▼─────────────────────────────────────┐
//!  │  Context  (send / deliver / arm / cancel) │
//!  └────┬──────────────────────────┬──────────┘
//!       │                          │
//!  ┌────▼──────┐            ┌──────▼─────┐
//!  │ Emulator  │            │  Session   │
//!  │ (discrete │            │ (one tokio │
//!  │  events)  │            │ task each) │
//!  └───────────┘            └────────────┘
//! ```
//!
//! The engines are synchronous state machines: every input is a method call
//! and every side effect goes through a [`context::Context`].  The same
//! engines run under the deterministic emulator and the async session.
//!
//! Each module has a single responsibility:
//! - [`packet`]     — packet and message types, datagram codec
//! - [`integrity`]  — additive integrity value and corruption check
//! - [`seq_space`]  — modular sequence numbers and window membership
//! - [`config`]     — acknowledgment policy, sizing rules, validation
//! - [`context`]    — boundary operations an engine may invoke
//! - [`timer`]      — the sender's single retransmission timer
//! - [`stats`]      — observability counters
//! - [`sender`]     — outbound sliding window
//! - [`receiver`]   — inbound window and in-order delivery
//! - [`emulator`]   — reproducible lossy/corrupting link in simulated time
//! - [`session`]    — actor runtime on tokio

pub mod config;
pub mod context;
pub mod emulator;
pub mod integrity;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq_space;
pub mod session;
pub mod stats;
pub mod timer;

pub use config::{AckPolicy, ConfigError, ProtocolConfig};
pub use context::{Context, Endpoint};
pub use packet::{Message, Packet};
pub use receiver::Receiver;
pub use sender::Sender;
