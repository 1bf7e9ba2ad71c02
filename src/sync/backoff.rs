//! Exponential retry backoff shared by network bring-up and upload jobs.
//!
//! The n-th consecutive failure waits `FLOOR << (n - 1)`, capped at
//! [`BACKOFF_CAP_MS`]; a success resets to the floor.

pub const BACKOFF_FLOOR_MS: u64 = 1000;
pub const BACKOFF_CAP_MS: u64 = 60_000;

/// Largest useful shift: `1000 << 6` already exceeds the cap.
const MAX_SHIFT: u32 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backoff {
    failures: u32,
    last_failure_ms: Option<u64>,
}

impl Backoff {
    pub const fn new() -> Self {
        Self {
            failures: 0,
            last_failure_ms: None,
        }
    }

    /// Current wait after the most recent failure.
    pub fn delay_ms(&self) -> u64 {
        match self.failures {
            0 => BACKOFF_FLOOR_MS,
            n => (BACKOFF_FLOOR_MS << (n - 1).min(MAX_SHIFT)).min(BACKOFF_CAP_MS),
        }
    }

    /// Count a failure at `now_ms`; returns the wait before the next attempt.
    pub fn record_failure(&mut self, now_ms: u64) -> u64 {
        self.failures = self.failures.saturating_add(1);
        self.last_failure_ms = Some(now_ms);
        self.delay_ms()
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.last_failure_ms = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// `true` once the wait after the last failure has elapsed.
    pub fn ready(&self, now_ms: u64) -> bool {
        match self.last_failure_ms {
            None => true,
            Some(at) => now_ms.saturating_sub(at) >= self.delay_ms(),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn delay_stays_within_bounds(failures in 0usize..200) {
            let mut b = Backoff::new();
            let mut prev = 0;
            for _ in 0..failures {
                let d = b.record_failure(0);
                prop_assert!((BACKOFF_FLOOR_MS..=BACKOFF_CAP_MS).contains(&d));
                prop_assert!(d >= prev);
                prev = d;
            }
        }
    }
}
