//! Three-phase restart backoff for a camera's ingest.
//!
//! Generalizes the flat `min(3 + 2*attempt, 30)` schedule of the source's
//! `_monitor_streams` into the three phases the design calls for: quick
//! retries while the camera is likely flapping, extended retries once it
//! looks persistently down, and a long-term floor for overnight recovery.

use std::time::Duration;

/// Upper bound of Phase A (quick) attempts.
const PHASE_A_MAX_ATTEMPT: u32 = 10;
/// Upper bound of Phase B (extended) attempts.
const PHASE_B_MAX_ATTEMPT: u32 = 30;

/// How long an ingest must run continuously before its retry counter is
/// reset to zero.
pub const STABLE_RESET_AFTER: Duration = Duration::from_secs(120);

/// Tracks the consecutive-failure count for one camera's ingest and derives
/// the delay before the next restart attempt.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    /// A fresh retry counter, as held by a camera that has never failed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of consecutive failures recorded so far.
    #[must_use]
    pub fn attempt(self) -> u32 {
        self.attempt
    }

    /// Records one more failed attempt and returns the delay to wait before
    /// the next spawn.
    pub fn record_failure(&mut self) -> Duration {
        self.attempt += 1;
        self.delay_for(self.attempt)
    }

    /// Resets the counter, as happens once the ingest has been stable for
    /// [`STABLE_RESET_AFTER`].
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay_for(self, attempt: u32) -> Duration {
        if attempt <= PHASE_A_MAX_ATTEMPT {
            let secs = (3 + 2 * (attempt.saturating_sub(1))).min(30);
            Duration::from_secs(u64::from(secs))
        } else if attempt <= PHASE_B_MAX_ATTEMPT {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(300)
        }
    }
}

#[cfg(test)]
mod retry_spec {
    use super::*;

    #[test]
    fn s2_phase_a_backoff_sequence() {
        let mut state = RetryState::new();
        let expected = [3, 5, 7, 9, 11, 13, 15, 17, 19, 21];
        for want in expected {
            let delay = state.record_failure();
            assert_eq!(delay, Duration::from_secs(want));
        }
    }

    #[test]
    fn phase_b_is_flat_sixty_seconds() {
        let mut state = RetryState::new();
        for _ in 0..10 {
            let _ = state.record_failure();
        }
        for _ in 0..20 {
            assert_eq!(state.record_failure(), Duration::from_secs(60));
        }
        assert_eq!(state.attempt(), 30);
    }

    #[test]
    fn phase_c_is_flat_five_minutes_and_unbounded() {
        let mut state = RetryState::new();
        for _ in 0..30 {
            let _ = state.record_failure();
        }
        for _ in 0..50 {
            assert_eq!(state.record_failure(), Duration::from_secs(300));
        }
    }

    #[test]
    fn reset_clears_the_counter() {
        let mut state = RetryState::new();
        let _ = state.record_failure();
        let _ = state.record_failure();
        assert_eq!(state.attempt(), 2);
        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.record_failure(), Duration::from_secs(3));
    }
}
