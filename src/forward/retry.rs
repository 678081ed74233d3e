//! Exponential backoff retry primitive shared by write retries and reconnects.

use std::{fmt::Display, thread, time::Duration};

use log::debug;

use super::config::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_RETRY_COUNT};

/// Retry limit and backoff schedule.
///
/// The delay after failed attempt `a` (1-indexed) is `2^a * base_delay`,
/// clamped to `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_COUNT,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `max_retries` retries on the default schedule.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total number of times an operation may run, initial attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sleep applied after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds or has failed [`max_attempts`] times,
    /// sleeping on the calling thread between attempts.
    ///
    /// [`max_attempts`]: Self::max_attempts
    pub fn retry<T, E: Display>(&self, op: impl FnMut() -> Result<T, E>) -> Result<T, E> {
        self.retry_with_sleep(thread::sleep, op)
    }

    /// Like [`retry`](Self::retry) with an injectable sleep function.
    pub fn retry_with_sleep<T, E: Display>(
        &self,
        mut sleep: impl FnMut(Duration),
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut attempt = 0u32;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;
            debug!(
                "retry attempt {attempt}/{} failed: {err}",
                self.max_attempts()
            );
            if attempt > self.max_retries {
                return Err(err);
            }
            sleep(self.delay_for(attempt));
        }
    }
}
