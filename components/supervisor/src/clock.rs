//! Injectable wall-clock, so signed-URL expiry and backoff timing can be
//! driven deterministically from tests.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Production code uses [`SystemClock`]; tests substitute a fixed or
/// stepped clock to drive S2/S4/S6-style scenarios and the URL-signing
/// round-trip property without sleeping real time.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the OS wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
