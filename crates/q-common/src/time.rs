// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Time utilities for Qbitel TrustCore
//!
//! Measurements and audit records are stamped with a [`Timestamp`] taken from
//! an injected [`Clock`]. Retries against hardware use [`Backoff`].

use core::ops::Sub;
use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Milliseconds since the clock's epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create from raw milliseconds
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Get the raw millisecond count
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed between `self` and a later `now`
    #[must_use]
    pub const fn elapsed(&self, now: Self) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Zero timestamp
    pub const ZERO: Self = Self(0);
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for u64 {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// Source of timestamps
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Monotonic clock counting from construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a new clock at zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let ms = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        Timestamp(ms)
    }
}

/// Manually advanced clock, for simulation and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start`
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self {
            ms: AtomicU64::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.ms.load(Ordering::SeqCst))
    }
}

/// Bounded exponential backoff
///
/// Yields at most `max_retries` delays: `base`, `2*base`, `4*base`, ...
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max_retries: u32,
    attempt: u32,
}

impl Backoff {
    /// Largest single delay, regardless of attempt count
    pub const MAX_DELAY: Duration = Duration::from_millis(500);

    /// Create a new backoff schedule
    #[must_use]
    pub const fn new(base: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_retries,
            attempt: 0,
        }
    }

    /// Number of delays already handed out
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt += 1;
        Some(self.base.saturating_mul(factor).min(Self::MAX_DELAY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now().as_millis(), 100);
        clock.advance(25);
        assert_eq!(clock.now() - Timestamp::from_millis(100), 25);
    }

    #[test]
    fn test_monotonic_clock_does_not_go_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_backoff_schedule() {
        let delays: Vec<_> = Backoff::new(Duration::from_millis(2), 3).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2),
                Duration::from_millis(4),
                Duration::from_millis(8)
            ]
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let last = Backoff::new(Duration::from_millis(400), 4).last();
        assert_eq!(last, Some(Backoff::MAX_DELAY));
    }

    #[test]
    fn test_zero_retries() {
        assert_eq!(Backoff::new(Duration::from_millis(1), 0).next(), None);
    }
}
