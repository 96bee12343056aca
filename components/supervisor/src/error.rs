//! Error taxonomy of the Stream Supervisor.
//!
//! These are kinds, not a single catch-all type: callers match on them to
//! decide whether to retry, tear down an entity, or propagate to `main`.

use derive_more::{Display, Error, From};

/// Failure of a single supervised operation (ingest or broadcast).
///
/// Confined to the entity it concerns: a bad camera or broadcast never
/// prevents the reconciler from servicing others.
#[derive(Debug, Display, Error)]
pub enum SupervisorError {
    /// Outbound HTTP call to the control plane failed or timed out.
    ///
    /// Caller retries with a short linear backoff and then defers to the
    /// next periodic tick.
    #[display(fmt = "transient network error: {}", _0)]
    TransientNetwork(#[error(not(source))] String),

    /// The control plane returned a 4xx response.
    ///
    /// `404` on a per-camera endpoint means the entity was deleted upstream
    /// and must be torn down locally; other 4xx codes are logged and
    /// treated as transient.
    #[display(fmt = "control plane rejected request: {} {}", status, body)]
    RemoteRejected {
        /// HTTP status code returned by the control plane.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The transcoder binary could not be launched.
    ///
    /// Counts against the retry budget of the owning entity.
    #[display(fmt = "failed to spawn transcoder: {}", _0)]
    SpawnFailed(#[error(not(source))] String),

    /// The TCP reachability pre-check against the source host/port failed.
    ///
    /// Does not count against the retry budget and does not spawn a
    /// process; the camera is retried on the next tick.
    #[display(fmt = "source unreachable: {}", _0)]
    SourceUnreachable(#[error(not(source))] String),

    /// A running handle was observed exited.
    #[display(
        fmt = "transcoder exited unexpectedly (code {:?}): {}",
        exit_code,
        stderr_tail
    )]
    ExitedUnexpectedly {
        /// Process exit code, if the OS reported one.
        exit_code: Option<i32>,
        /// Tail of the process's captured diagnostic output.
        stderr_tail: String,
    },

    /// A broadcast's retry budget is exhausted.
    ///
    /// The "failed" marker is set and the entry is not touched again until
    /// the control plane drops it.
    #[display(fmt = "permanently failed after {} retries", retries)]
    PermanentFailed {
        /// Number of consecutive spawn/exit cycles observed.
        retries: u32,
    },

    /// Shutdown is in progress; the operation unwound cleanly.
    #[display(fmt = "cancelled")]
    Cancelled,
}

/// Result alias for fallible supervisor operations.
pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;

/// Fatal startup failure.
///
/// The only two fatal conditions named by the design: missing required
/// configuration, and inability to create the HLS root directory.
#[derive(Debug, Display, Error, From)]
pub enum Failure {
    /// Required configuration was missing or invalid.
    #[display(fmt = "invalid configuration: {}", _0)]
    Config(#[error(not(source))] String),

    /// The HLS root directory could not be created.
    #[display(fmt = "failed to create HLS root: {}", _0)]
    HlsRoot(std::io::Error),
}
