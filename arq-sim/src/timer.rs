//! Retransmission timer bookkeeping for the sender.
//!
//! The environment owns the actual clock (see [`crate::context::Context`]);
//! this module tracks whether the single logical timer is armed so the
//! sender can uphold two rules:
//!
//! - starting the timer while it runs first cancels the running instance, so
//!   no two timers ever coexist;
//! - the timer runs if and only if at least one packet is in flight.
//!
//! The timeout is fixed for the whole session; there is no RTT estimation
//! and no back-off.

use std::time::Duration;

use crate::context::Context;

/// One logical retransmission timer.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    rto: Duration,
    running: bool,
}

impl RetransmitTimer {
    pub fn new(rto: Duration) -> Self {
        Self {
            rto,
            running: false,
        }
    }

    /// The fixed retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// `true` while an expiry is pending.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Arm the timer, cancelling the running instance first if there is one.
    pub fn start(&mut self, ctx: &mut impl Context) {
        if self.running {
            ctx.cancel_timer();
        }
        ctx.arm_timer(self.rto);
        self.running = true;
    }

    /// Cancel the timer if it is running.
    pub fn stop(&mut self, ctx: &mut impl Context) {
        if self.running {
            ctx.cancel_timer();
            self.running = false;
        }
    }

    /// Record that the environment fired the timer.  A fired timer is no
    /// longer armed until started again.
    pub fn expired(&mut self) {
        self.running = false;
    }
}
