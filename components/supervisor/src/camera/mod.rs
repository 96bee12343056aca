//! Per-camera ingest: entities, retry state machine, reachability
//! pre-check, and the supervisor that keeps exactly one ingest process
//! alive per camera with `has_stream_config`.

mod reachability;
mod retry;
mod supervisor;

pub use reachability::{is_reachable, DEFAULT_RTSP_PORT, REACHABILITY_TIMEOUT};
pub use retry::{RetryState, STABLE_RESET_AFTER};
pub use supervisor::CameraSupervisor;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::transcoder::{ExitInfo, Handle};
use crate::types::CameraId;

/// Declared configuration of a camera, as the reconciler sees it from the
/// control plane's consolidated snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CameraConfig {
    pub id: CameraId,
    pub name: String,
    /// Source RTSP URL, with credentials as declared (not yet normalized).
    pub source_url: String,
    pub has_stream_config: bool,
}

/// Live ingest for one camera: the process handle plus everything §3
/// requires an Ingest Stream to track.
///
/// The retry counter is deliberately NOT kept here: it must survive the
/// interval where the camera has no [`IngestStream`] at all (between a
/// reap and the delayed restart it schedules), so the owning
/// [`supervisor::CameraSupervisor`] keeps it in a side map instead.
pub struct IngestStream {
    pub handle: Handle,
    pub started_at: DateTime<Utc>,
    pub last_exit: Option<ExitInfo>,
    pub segment_dir: PathBuf,
    pub segment_token: String,
    pub signed_url: Option<SignedUrl>,
    pub last_url_refresh: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl IngestStream {
    /// Whether this ingest has been continuously running for at least
    /// [`STABLE_RESET_AFTER`], as of `now`.
    #[must_use]
    pub fn is_stable(&self, now: DateTime<Utc>) -> bool {
        self.handle.running()
            && now.signed_duration_since(self.started_at)
                >= chrono::Duration::from_std(STABLE_RESET_AFTER).unwrap()
    }
}

/// A signed public HLS URL and the instant it expires.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub signed_at: DateTime<Utc>,
}
