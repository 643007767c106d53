use std::time::Duration;

use crate::errors::ClientError;

/// How the relay repeats one-shot calls that failed transiently.
///
/// Streamed runs never consult this: repeating one would start a second
/// remote run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    first_delay: Duration,
    multiplier: f64,
    delay_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    const DEFAULT_CAP: Duration = Duration::from_secs(30);

    /// Every failure is final.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            first_delay: Duration::ZERO,
            multiplier: 1.0,
            delay_cap: Self::DEFAULT_CAP,
        }
    }

    /// Up to `max_retries` repeats, waiting `first_delay * multiplier^n`
    /// before repeat `n` (capped at 30 s unless overridden).
    pub fn exponential(max_retries: u32, first_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            first_delay,
            multiplier: if multiplier >= 1.0 { multiplier } else { 2.0 },
            delay_cap: Self::DEFAULT_CAP,
        }
    }

    pub fn capped_at(mut self, cap: Duration) -> Self {
        self.delay_cap = cap;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the next attempt, or `None` when `err` is final or the
    /// retry budget is spent.
    pub fn next_delay(&self, err: &ClientError, retries_done: u32) -> Option<Duration> {
        if retries_done >= self.max_retries || !err.is_retryable() {
            return None;
        }
        let factor = self.multiplier.powi(retries_done.min(i32::MAX as u32) as i32);
        let secs = self.first_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.delay_cap.as_secs_f64() {
            return Some(self.delay_cap);
        }
        Some(self.first_delay.mul_f64(factor))
    }
}
