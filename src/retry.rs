//! Retry policies for `program::retry`.
//!
//! Adapted from the teacher crate's `RetryPolicy`
//! (`examples/restatedev-sdk-shared-core/src/retries.rs`): same four-way shape (infinite / none /
//! fixed delay / exponential backoff with a cap), trimmed of the wire-protocol-specific
//! `max_duration` wall-clock bookkeeping since this crate's `Sleep` effect already routes through
//! whichever clock (virtual or wall) the run is using.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    /// Never give up.
    Infinite,
    /// Never retry; the first failure is final.
    None,
    /// Sleep a fixed `interval` between attempts, up to `max_attempts` retries.
    FixedDelay {
        interval: Duration,
        max_attempts: u32,
    },
    /// Sleep `initial_interval * factor^attempt`, capped at `max_interval`, up to `max_attempts`
    /// retries.
    Exponential {
        initial_interval: Duration,
        factor: f64,
        max_interval: Duration,
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// The delay before retry attempt number `attempt` (0-indexed, counting the delay *after* the
    /// `attempt`-th failure), or `None` if no further retry should happen.
    pub(crate) fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Infinite => Some(Duration::ZERO),
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay {
                interval,
                max_attempts,
            } => {
                if attempt < *max_attempts {
                    Some(*interval)
                } else {
                    None
                }
            }
            RetryPolicy::Exponential {
                initial_interval,
                factor,
                max_interval,
                max_attempts,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let scaled = initial_interval.as_secs_f64() * factor.powi(attempt as i32);
                let capped = scaled.min(max_interval.as_secs_f64());
                Some(Duration::from_secs_f64(capped.max(0.0)))
            }
        }
    }
}
