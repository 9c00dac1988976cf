//! # Infinite Backoff
//!
//! Capped exponential backoff that never gives up.
//!
//! Used by the watch loop: every stream error sleeps for the next delay and
//! the stream is resumed. A successful event resets the sequence.
//!
//! Sequence with the defaults (100ms, factor 2, 60s cap):
//! 0.1s, 0.2s, 0.4s, ... 51.2s, 60s, 60s, ...
//!
//! ## Usage
//!
//! ```rust
//! use bitwarden_secrets_controller::controller::backoff::InfiniteBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = InfiniteBackoff::default();
//! assert_eq!(backoff.next(), Some(Duration::from_millis(100)));
//! assert_eq!(backoff.next(), Some(Duration::from_millis(200)));
//! ```

use crate::constants::{DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_INITIAL_MS, DEFAULT_BACKOFF_MAX_MS};
use std::time::Duration;

/// Exponential backoff iterator, capped and never exhausted
#[derive(Debug, Clone)]
pub struct InfiniteBackoff {
    initial: Duration,
    factor: u32,
    max: Duration,
    /// Next delay before capping
    current: Duration,
}

impl InfiniteBackoff {
    /// Create a backoff starting at `initial`, multiplied by `factor` per step, capped at `max`
    ///
    /// A factor of 0 is treated as 1 (constant delay).
    #[must_use]
    pub fn new(initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            initial,
            factor: factor.max(1),
            max,
            current: initial,
        }
    }

    /// Advance the sequence and return the delay to wait
    pub fn next_delay(&mut self) -> Duration {
        if self.current >= self.max {
            return self.max;
        }
        let delay = self.current;
        // Saturate instead of overflowing for very large factors
        self.current = self
            .current
            .checked_mul(self.factor)
            .unwrap_or(self.max);
        delay
    }

    /// Restart the sequence at the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for InfiniteBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MS),
            DEFAULT_BACKOFF_FACTOR,
            Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        )
    }
}

impl Iterator for InfiniteBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
