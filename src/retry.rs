//! Retry budget and backoff between attempts.
//!
//! The dispatch engine only retries timeouts and connection failures. How many
//! times is decided by [`RetryAttempts`]; how long to wait in between is decided
//! by [`Backoff`].

use crate::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// The total number of attempts the engine may make for one request.
///
/// `0` disables retrying (a single attempt is made). Otherwise the budget must
/// be within `1..=5`, and it counts every attempt including the first.
///
/// # Examples
///
/// ```
/// use restbind::RetryAttempts;
///
/// assert_eq!(RetryAttempts::new(0).unwrap().total_attempts(), 1);
/// assert_eq!(RetryAttempts::new(3).unwrap().total_attempts(), 3);
/// assert!(RetryAttempts::new(6).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryAttempts(u32);

impl RetryAttempts {
    /// The largest accepted budget.
    pub const MAX: u32 = 5;

    /// Validates a retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for values above [`RetryAttempts::MAX`].
    pub fn new(attempts: u32) -> Result<Self> {
        if attempts > Self::MAX {
            return Err(Error::Configuration(format!(
                "Retry attempts must be 0 (disabled) or between 1 and {}, got {}",
                Self::MAX,
                attempts
            )));
        }
        Ok(Self(attempts))
    }

    /// The configured value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// The number of attempts to make, never less than one.
    pub fn total_attempts(self) -> usize {
        self.0.max(1) as usize
    }
}

/// Defines how long to wait between attempts.
///
/// # Examples
///
/// ```
/// use restbind::Backoff;
/// use std::time::Duration;
///
/// // Re-send immediately
/// let none = Backoff::None;
///
/// // Exponential backoff: 100ms, 200ms, 400ms...
/// let exponential = Backoff::Exponential {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(5),
///     jitter: true,
/// };
///
/// // Fixed delay: 1s, 1s, 1s...
/// let fixed = Backoff::Fixed(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Backoff {
    /// Re-send as soon as an attempt fails.
    #[default]
    None,

    /// Wait the same delay before every retry.
    Fixed(Duration),

    /// Wait `initial_delay * 2^(retry - 1)`, capped at `max_delay`.
    ///
    /// Optional jitter scales each delay to a random point between 50% and 100%.
    Exponential {
        /// The delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between retries.
        max_delay: Duration,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },
}

impl Backoff {
    /// Returns the delay before the given retry, or `None` to retry immediately.
    ///
    /// # Arguments
    ///
    /// * `retry` - The retry number (1-indexed, so 1 = the second attempt)
    pub fn delay_before_retry(&self, retry: usize) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed(delay) => Some(*delay),
            Backoff::Exponential {
                initial_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u64.saturating_pow(retry.saturating_sub(1) as u32);
                let base_delay =
                    initial_delay.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = base_delay.min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(jitter_factor))
                } else {
                    Some(delay)
                }
            }
        }
    }
}
