//! # Repeat Policy
//!
//! Bounded redelivery of envelopes whose handler asked to try again later.
//!
//! A [`RepeatMessage`] travels with the envelope as an item. Every time the
//! transport re-publishes the envelope it attaches a copy with the attempt count
//! advanced by one; once `attempts` reaches `max_attempts` the policy is exhausted
//! and the envelope is reported instead of re-published.
//!
//! The delay applied to each re-publish is computed by a [`Backoff`] from the
//! base delay and the attempt count.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay growth for repeated deliveries
///
/// Every variant is monotonic non-decreasing in the attempt count and yields a
/// strictly positive delay whenever the base delay is positive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Always the base delay
    Constant,

    /// `base * attempts`
    #[default]
    Linear,

    /// `base * multiplier^(attempts - 1)`, optionally capped
    Exponential {
        multiplier: f64,
        #[serde(default, rename = "maxDelay", alias = "maxdelay")]
        max_delay_ms: Option<u64>,
    },
}

impl Backoff {
    /// Calculate the delay in milliseconds for a given attempt
    ///
    /// Attempts are counted from 1; an attempt count of 0 is treated as 1 so the
    /// first delivery is never scheduled earlier than the base delay.
    pub fn delay_ms(&self, base_ms: u64, attempts: u32) -> u64 {
        let attempt = attempts.max(1);

        match *self {
            Self::Constant => base_ms,
            Self::Linear => base_ms.saturating_mul(u64::from(attempt)),
            Self::Exponential {
                multiplier,
                max_delay_ms,
            } => {
                if base_ms == 0 {
                    return 0;
                }

                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let factor = multiplier.max(1.0).powi(exponent);
                let grown = (base_ms as f64 * factor).min(u64::MAX as f64);
                let grown = (grown.round() as u64).max(base_ms);

                match max_delay_ms {
                    Some(cap) if cap > 0 => grown.min(cap),
                    _ => grown,
                }
            }
        }
    }
}

/// Repeat policy attached to an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatMessage {
    delay_ms: u64,
    attempts: u32,
    max_attempts: u32,
    #[serde(default)]
    backoff: Backoff,
}

impl RepeatMessage {
    /// Create a fresh policy with no attempts made yet
    ///
    /// # Examples
    ///
    /// ```rust
    /// use queue_relay_core::RepeatMessage;
    /// use std::time::Duration;
    ///
    /// let repeat = RepeatMessage::new(Duration::from_secs(1), 3);
    /// assert!(repeat.is_repeatable());
    /// assert_eq!(repeat.attempts(), 0);
    /// ```
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay_ms: delay.as_millis().min(u128::from(u64::MAX)) as u64,
            attempts: 0,
            max_attempts,
            backoff: Backoff::default(),
        }
    }

    /// Start counting from a caller-supplied attempt number
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Replace the delay growth function
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Base delay between deliveries
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Whether another delivery may be scheduled
    pub fn is_repeatable(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Policy for the next re-publish: same delay and limit, one more attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }

    /// Delivery delay for the envelope carrying this policy
    pub fn next_delay(&self) -> Duration {
        Duration::from_millis(self.backoff.delay_ms(self.delay_ms, self.attempts))
    }
}

#[cfg(test)]
#[path = "repeat_tests.rs"]
mod tests;
