//! Boundary between the protocol engines and their environment.
//!
//! The engines never touch a link, a clock or an application directly.  Each
//! event handler receives a `&mut impl Context` bound to the endpoint it runs
//! on and calls back into it.  The deterministic emulator and the async
//! session runtime each provide their own implementation; unit tests use a
//! recording double.

use std::fmt;
use std::time::Duration;

use crate::packet::{Message, Packet};

/// Identifies one of the two endpoints of a simplex session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Originates data (A).
    Sender,
    /// Consumes data and returns acknowledgments (B).
    Receiver,
}

impl Endpoint {
    /// The endpoint on the other end of the link.
    pub fn peer(self) -> Self {
        match self {
            Endpoint::Sender => Endpoint::Receiver,
            Endpoint::Receiver => Endpoint::Sender,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Sender => f.write_str("A"),
            Endpoint::Receiver => f.write_str("B"),
        }
    }
}

/// Services an endpoint's environment provides while it handles one event.
pub trait Context {
    /// Hand a packet to the unreliable channel toward the peer.
    fn send_to_network(&mut self, packet: Packet);

    /// Hand an in-order payload to the application layer.
    fn deliver_to_application(&mut self, message: Message);

    /// Arm the endpoint's single timer.  Arming an armed timer replaces it.
    fn arm_timer(&mut self, duration: Duration);

    /// Cancel the endpoint's timer; a no-op when it is not armed.
    fn cancel_timer(&mut self);
}
