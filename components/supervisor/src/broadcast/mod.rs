//! Per-broadcast fan-out: entity and the supervisor that keeps exactly one
//! fan-out process alive per broadcast the control plane currently
//! declares active.

mod supervisor;

pub use supervisor::BroadcastSupervisor;

use chrono::{DateTime, Utc};

use crate::transcoder::{ExitInfo, Handle};
use crate::types::{BroadcastId, CameraId};

/// Maximum consecutive retries before a broadcast is marked "failed".
pub const YOUTUBE_MAX_RETRIES: u32 = 5;

/// Fixed delay between broadcast restart attempts.
pub const YOUTUBE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Declared configuration of a broadcast, as the reconciler sees it from
/// the control plane's consolidated snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BroadcastConfig {
    pub id: BroadcastId,
    pub camera_id: CameraId,
    pub remote_url: String,
    pub stream_key: String,
}

/// Live fan-out for one broadcast.
pub struct FanOut {
    pub handle: Handle,
    pub camera_id: CameraId,
    pub started_at: DateTime<Utc>,
    pub last_exit: Option<ExitInfo>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}
