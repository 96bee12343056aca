//! Common identifiers and small utility types shared across the
//! supervisor's components.

use derive_more::{Deref, Display, From, Into};
use futures::future;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identifiers supplied by the control plane are embedded verbatim into
/// outbound URL paths and local segment directory names; this bounds them
/// to characters safe for both before they're trusted with either.
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap());

/// Whether `id` is safe to embed as a URL path segment and a directory
/// name, per the restriction every id-bearing endpoint in §6 relies on.
#[must_use]
pub fn is_path_safe_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

/// Opaque identity of a `Camera`, assigned by the control plane.
#[derive(
    Clone,
    Debug,
    Deref,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
pub struct CameraId(String);

impl CameraId {
    /// Borrows the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque identity of a `Broadcast`, assigned by the control plane.
#[derive(
    Clone,
    Debug,
    Deref,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
pub struct BroadcastId(String);

impl BroadcastId {
    /// Borrows the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Abort handle of a background future that aborts it on [`Drop`].
///
/// Used to cancel delayed-restart tasks and log readers without leaving
/// them to run past the lifetime of the entry they serve.
#[derive(Debug)]
pub struct DroppableAbortHandle(future::AbortHandle);

impl DroppableAbortHandle {
    /// Wraps the given `handle`, to be aborted once this value is dropped.
    #[must_use]
    pub fn new(handle: future::AbortHandle) -> Self {
        Self(handle)
    }
}

impl Drop for DroppableAbortHandle {
    #[inline]
    fn drop(&mut self) {
        self.0.abort();
    }
}
