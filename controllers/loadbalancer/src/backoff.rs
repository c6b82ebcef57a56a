//! # Exponential Backoff
//!
//! Backoff applied by the watcher's error policy when a reconcile pass fails
//! with a permanent error. Transient errors never reach it; they requeue
//! after a fixed delay instead.
//!
//! Sequence: 5s, 10s, 20s, 40s, 80s, 160s, 300s (max).

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each backoff is twice the previous one, capped at the maximum.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First backoff value in seconds (for reset)
    initial_seconds: u64,
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(5, 300)
    }
}

impl ExponentialBackoff {
    /// Create a new exponential backoff
    ///
    /// # Arguments
    ///
    /// * `initial_seconds` - First backoff duration in seconds
    /// * `max_seconds` - Cap for the sequence in seconds
    #[must_use]
    pub fn new(initial_seconds: u64, max_seconds: u64) -> Self {
        Self {
            initial_seconds,
            current_seconds: initial_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_seconds;
        self.current_seconds = self.current_seconds.saturating_mul(2).min(self.max_seconds);
        result_seconds
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current_seconds = self.initial_seconds;
    }
}
