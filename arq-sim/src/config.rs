//! Protocol configuration and its validation.
//!
//! Both endpoints of a session must be built from the same
//! [`ProtocolConfig`].  The sequence space has to be large enough for the
//! chosen acknowledgment policy, otherwise an old retransmission can alias a
//! new sequence number and be delivered in its place:
//!
//! | Policy       | Minimum `seq_space_size` |
//! |--------------|--------------------------|
//! | Cumulative   | `window_size + 1`        |
//! | Selective    | `2 × window_size`        |

use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

/// Default retransmission timeout (16 time units).
pub const DEFAULT_RTO: Duration = Duration::from_millis(16);

/// Upper bound for every configured duration (one year).  Keeps clock
/// arithmetic in the runtimes far from overflow.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

/// How the sender interprets acknowledgments and what it resends on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum AckPolicy {
    /// Go-Back-N: an ACK for `s` covers every earlier in-window packet; a
    /// timeout resends the whole window.
    #[value(alias = "gbn")]
    Cumulative,
    /// Selective Repeat: an ACK covers exactly one packet; a timeout resends
    /// only the oldest unacknowledged packet.
    #[default]
    #[value(alias = "sr")]
    Selective,
}

impl AckPolicy {
    /// Smallest sequence space that keeps old and new sequence numbers apart.
    /// Saturates at `usize::MAX` for absurd windows.
    pub fn min_seq_space(self, window_size: usize) -> usize {
        match self {
            AckPolicy::Cumulative => window_size.saturating_add(1),
            AckPolicy::Selective => window_size.saturating_mul(2),
        }
    }
}

impl fmt::Display for AckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckPolicy::Cumulative => f.write_str("cumulative"),
            AckPolicy::Selective => f.write_str("selective"),
        }
    }
}

/// Errors reported for unusable configurations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("sequence space of {actual} is too small for a {policy} window of {window}; need at least {required}")]
    SeqSpaceTooSmall {
        policy: AckPolicy,
        window: usize,
        required: usize,
        actual: u32,
    },
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("{name} must not exceed {max:?}, got {value:?}")]
    TooLarge {
        name: &'static str,
        value: Duration,
        max: Duration,
    },
}

/// Constants consumed by both protocol engines.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    /// Maximum number of sender packets in flight; receiver buffer size.
    pub window_size: usize,
    /// Number of distinct sequence numbers (`0..seq_space_size`).
    pub seq_space_size: u32,
    /// Fixed retransmission timeout.
    pub rto: Duration,
    pub policy: AckPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::selective_repeat()
    }
}

impl ProtocolConfig {
    /// Selective Repeat with window 6 over a 12-number space.
    pub fn selective_repeat() -> Self {
        Self {
            window_size: 6,
            seq_space_size: 12,
            rto: DEFAULT_RTO,
            policy: AckPolicy::Selective,
        }
    }

    /// Go-Back-N with window 3 over an 8-number space.
    pub fn go_back_n() -> Self {
        Self {
            window_size: 3,
            seq_space_size: 8,
            rto: DEFAULT_RTO,
            policy: AckPolicy::Cumulative,
        }
    }

    /// Check the window and sequence-space sizing rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.rto.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        check_duration("retransmission timeout", self.rto)?;
        let required = self.policy.min_seq_space(self.window_size);
        if (self.seq_space_size as usize) < required {
            return Err(ConfigError::SeqSpaceTooSmall {
                policy: self.policy,
                window: self.window_size,
                required,
                actual: self.seq_space_size,
            });
        }
        Ok(())
    }
}

/// Reject anything outside `[0, 1]` (NaN included).
pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

/// Reject durations above [`MAX_DURATION`].
pub(crate) fn check_duration(name: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value <= MAX_DURATION {
        Ok(())
    } else {
        Err(ConfigError::TooLarge {
            name,
            value,
            max: MAX_DURATION,
        })
    }
}
