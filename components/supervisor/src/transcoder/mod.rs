//! Handle to one long-lived external transcoder process.
//!
//! This is the leaf of the supervision tree (§4.1 of the design): it owns
//! nothing but a single OS child process, and knows nothing about cameras,
//! broadcasts, or the control plane. Everything above it (the camera and
//! broadcast supervisors) builds on top of [`Handle`].

mod handle;

pub use handle::{ExitInfo, Handle};
