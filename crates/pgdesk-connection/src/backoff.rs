//! Exponential backoff for bounded retries
//!
//! Used wherever a write to durable storage is retried a fixed number of times
//! before the failure is surfaced.

use std::time::Duration;

/// Exponential backoff strategy.
///
/// # Example
///
/// ```
/// use pgdesk_connection::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(200, 2_000);
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(200));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(400));
/// assert!(backoff.calculate_delay(10) <= Duration::from_millis(2_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
}

impl BackoffStrategy {
    /// `initial_ms` is clamped to at least 1ms and `max_ms` to at least `initial_ms`.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
        }
    }

    /// Set the growth factor (at least 1.0, default 2.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Delay to wait after the zero-based `attempt` failed
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms.min(self.max_ms as f64) as u64)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffStrategy {
    /// 200ms initial, 2 seconds max, 2x multiplier
    fn default() -> Self {
        Self::new(200, 2_000)
    }
}
