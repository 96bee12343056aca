//! Keeps exactly one fan-out process alive per broadcast the control plane
//! currently declares active, owning the fixed-delay retry budget and the
//! "stopping"/"failed" guard sets that outlive a map entry by design (§9:
//! "implementers should resist merging them with the broadcast map").

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use edge_log::tracing::{debug, info, warn};

use crate::broadcast::{BroadcastConfig, FanOut, YOUTUBE_MAX_RETRIES, YOUTUBE_RETRY_DELAY};
use crate::clock::Clock;
use crate::control_plane::{self, ControlPlaneClient};
use crate::error::SupervisorError;
use crate::log_ring::DeviceLog;
use crate::transcoder::Handle;
use crate::types::{BroadcastId, DroppableAbortHandle};

/// Per-broadcast fan-out supervisor.
pub struct BroadcastSupervisor {
    transcoder_path: std::path::PathBuf,
    pool: HashMap<BroadcastId, FanOut>,
    retry_counts: HashMap<BroadcastId, u32>,
    pending: HashSet<BroadcastId>,
    /// Set before termination begins; cleared only once the control plane
    /// stops declaring the broadcast. A broadcast in this set is never
    /// restarted by the reconciler.
    stopping: HashSet<BroadcastId>,
    /// Set once the retry budget is exhausted; cleared only once the
    /// control plane stops declaring the broadcast.
    failed: HashSet<BroadcastId>,
    /// Abort handle of a broadcast's currently scheduled delayed restart.
    /// Dropping the entry aborts the task, so a stop/guard can never race a
    /// restart that fires against stale, already-torn-down config.
    restart_guards: HashMap<BroadcastId, DroppableAbortHandle>,
    log: Rc<RefCell<DeviceLog>>,
    clock: Rc<dyn Clock>,
}

impl BroadcastSupervisor {
    /// Creates an empty supervisor.
    #[must_use]
    pub fn new(transcoder_path: std::path::PathBuf, log: Rc<RefCell<DeviceLog>>, clock: Rc<dyn Clock>) -> Self {
        Self {
            transcoder_path,
            pool: HashMap::new(),
            retry_counts: HashMap::new(),
            pending: HashSet::new(),
            stopping: HashSet::new(),
            failed: HashSet::new(),
            restart_guards: HashMap::new(),
            log,
            clock,
        }
    }

    /// Registers the abort handle of `id`'s just-scheduled delayed restart,
    /// replacing (and thereby aborting) any handle already held for it.
    pub fn set_restart_guard(&mut self, id: BroadcastId, guard: DroppableAbortHandle) {
        self.restart_guards.insert(id, guard);
    }

    #[must_use]
    pub fn is_running(&self, id: &BroadcastId) -> bool {
        self.pool.contains_key(id)
    }

    #[must_use]
    pub fn is_pending(&self, id: &BroadcastId) -> bool {
        self.pending.contains(id)
    }

    /// Whether `id` is guarded against a reconciler-issued start: either
    /// "stopping" or "failed" (§3, §8 universal invariant).
    #[must_use]
    pub fn is_guarded(&self, id: &BroadcastId) -> bool {
        self.stopping.contains(id) || self.failed.contains(id)
    }

    #[must_use]
    pub fn running_ids(&self) -> Vec<BroadcastId> {
        self.pool.keys().cloned().collect()
    }

    /// Clears the "stopping"/"failed" guards and the retry counter for
    /// `id` once the control plane no longer declares it, per §4.3's
    /// invariant and S3's second tick.
    pub fn clear_guards(&mut self, id: &BroadcastId) {
        let was_stopping = self.stopping.remove(id);
        let was_failed = self.failed.remove(id);
        let _ = self.retry_counts.remove(id);
        let _ = self.pending.remove(id);
        let _ = self.restart_guards.remove(id);
        if was_stopping || was_failed {
            debug!(broadcast = %id, "guards cleared, declared state no longer lists broadcast");
        }
    }

    /// `start(broadcast_id, camera_id, remote_url, stream_key)`: declines
    /// if the camera's HLS playlist does not yet exist, or if `id` is
    /// guarded. Stamps the heartbeat timestamp immediately on success so
    /// the heartbeat loop does not fire in the same tick.
    pub async fn start(
        &mut self,
        broadcast: &BroadcastConfig,
        playlist_path: Option<&Path>,
        control: &ControlPlaneClient,
    ) -> Result<(), SupervisorError> {
        if self.pool.contains_key(&broadcast.id) {
            return Ok(());
        }
        if self.is_guarded(&broadcast.id) {
            debug!(broadcast = %broadcast.id, "start refused: guarded");
            return Ok(());
        }
        let Some(playlist_path) = playlist_path else {
            debug!(broadcast = %broadcast.id, "start declined: ingest playlist not yet present");
            return Ok(());
        };
        if !tokio::fs::try_exists(playlist_path).await.unwrap_or(false) {
            debug!(broadcast = %broadcast.id, "start declined: ingest playlist not yet present");
            return Ok(());
        }

        let argv = Self::build_fanout_argv(playlist_path, &broadcast.remote_url, &broadcast.stream_key);

        let log = Rc::clone(&self.log);
        let clock = Rc::clone(&self.clock);
        let entity_id = broadcast.id.as_str().to_owned();
        let handle = Handle::spawn(&self.transcoder_path, argv, move |line| {
            log.borrow_mut().record(&entity_id, clock.now(), line);
        })?;

        let now = self.clock.now();
        self.pool.insert(
            broadcast.id.clone(),
            FanOut {
                handle,
                camera_id: broadcast.camera_id.clone(),
                started_at: now,
                last_exit: None,
                last_heartbeat: Some(now),
            },
        );

        if let Err(e) = control.report_broadcast_status(&broadcast.id, "live", self.pool.get(&broadcast.id).map(|f| f.handle.pid()), None).await {
            warn!(broadcast = %broadcast.id, error = %e, "failed to report broadcast start");
        }
        info!(broadcast = %broadcast.id, "fan-out started");
        Ok(())
    }

    /// `stop(broadcast_id)`: marks "stopping" BEFORE termination, then
    /// terminates the handle and reports `complete`.
    pub async fn stop(&mut self, id: &BroadcastId, grace: Duration, control: &ControlPlaneClient) {
        self.stopping.insert(id.clone());
        let Some(mut fan_out) = self.pool.remove(id) else {
            return;
        };
        fan_out.handle.stop(grace).await;
        self.log.borrow_mut().forget(id.as_str());
        let _ = self.restart_guards.remove(id);
        if let Err(e) = control.report_broadcast_status(id, "complete", None, None).await {
            warn!(broadcast = %id, error = %e, "failed to report broadcast stop");
        }
        info!(broadcast = %id, "fan-out stopped");
    }

    /// Fast per-tick reap: for every fan-out whose process has exited,
    /// applies the fixed-delay retry budget, marking "failed" once
    /// exhausted. Returns, for every id whose retry was scheduled (not
    /// yet exhausted), the delay before the next attempt.
    pub async fn reap_exited(&mut self, control: &ControlPlaneClient) -> Vec<(BroadcastId, Duration)> {
        let exited: Vec<BroadcastId> = self
            .pool
            .iter()
            .filter(|(_, f)| !f.handle.running())
            .map(|(id, _)| id.clone())
            .collect();

        let mut scheduled = Vec::with_capacity(exited.len());
        for id in &exited {
            if let Some(fan_out) = self.pool.remove(id) {
                let exit_info = fan_out.handle.exit_info().unwrap_or_default();
                warn!(broadcast = %id, exit_code = ?exit_info.exit_code, "fan-out exited unexpectedly");
            }
            if let Some(delay) = self.schedule_retry_or_fail(id, control).await {
                scheduled.push((id.clone(), delay));
            }
        }
        scheduled
    }

    async fn schedule_retry_or_fail(&mut self, id: &BroadcastId, control: &ControlPlaneClient) -> Option<Duration> {
        if self.stopping.contains(id) {
            // A stop in flight already reports `complete`; do not also
            // apply the retry budget to a deliberately-terminated process.
            return None;
        }
        let attempt = {
            let counter = self.retry_counts.entry(id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if attempt < YOUTUBE_MAX_RETRIES {
            self.pending.insert(id.clone());
            debug!(broadcast = %id, attempt, "fan-out will retry");
            Some(YOUTUBE_RETRY_DELAY)
        } else {
            self.failed.insert(id.clone());
            let message = format!("fan-out failed after {YOUTUBE_MAX_RETRIES} retries");
            let report = control_plane::with_linear_retry(3, || control.report_broadcast_status(id, "error", None, Some(&message))).await;
            if let Err(e) = report {
                warn!(broadcast = %id, error = %e, "failed to report permanent broadcast failure");
            }
            None
        }
    }

    /// Called once a delayed restart's sleep has elapsed.
    pub async fn attempt_restart(
        &mut self,
        broadcast: &BroadcastConfig,
        playlist_path: Option<&Path>,
        control: &ControlPlaneClient,
    ) {
        let _ = self.pending.remove(&broadcast.id);
        let _ = self.restart_guards.remove(&broadcast.id);
        if self.is_guarded(&broadcast.id) {
            return;
        }
        if let Err(e) = self.start(broadcast, playlist_path, control).await {
            warn!(broadcast = %broadcast.id, error = %e, "restart attempt failed");
            let _ = self.schedule_retry_or_fail(&broadcast.id, control).await;
        }
    }

    /// Stamps the last-heartbeat timestamp for `id`.
    pub fn mark_heartbeat(&mut self, id: &BroadcastId, now: DateTime<Utc>) {
        if let Some(fan_out) = self.pool.get_mut(id) {
            fan_out.last_heartbeat = Some(now);
        }
    }

    /// Whether `id`'s fan-out is due for its status heartbeat.
    #[must_use]
    pub fn needs_heartbeat(&self, id: &BroadcastId, now: DateTime<Utc>, interval: Duration) -> bool {
        self.pool.get(id).is_some_and(|fan_out| {
            fan_out
                .last_heartbeat
                .map_or(true, |last| now.signed_duration_since(last) >= chrono::Duration::from_std(interval).unwrap())
        })
    }

    fn build_fanout_argv(playlist_path: &Path, remote_url: &str, stream_key: &str) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-live_start_index".into(),
            "-1".into(),
            "-i".into(),
            playlist_path.display().to_string(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-ar".into(),
            "44100".into(),
            "-af".into(),
            "aresample=async=1".into(),
            "-f".into(),
            "flv".into(),
            format!("{remote_url}{stream_key}"),
        ]
    }
}

#[cfg(test)]
mod broadcast_supervisor_spec {
    use super::*;
    use crate::broadcast::BroadcastConfig;
    use crate::clock::test_support::FixedClock;
    use crate::types::CameraId;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn harness() -> (BroadcastSupervisor, ControlPlaneClient, MockServer) {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/api/v1/device/youtube/broadcasts/.*/status/$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .mount(&mock)
            .await;

        let log = Rc::new(RefCell::new(DeviceLog::new()));
        let clock: Rc<dyn Clock> = Rc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        let supervisor = BroadcastSupervisor::new(std::path::PathBuf::from("sh"), log, clock);
        let control = ControlPlaneClient::new(mock.uri(), "device-1", "token");
        (supervisor, control, mock)
    }

    fn broadcast(id: &str) -> BroadcastConfig {
        BroadcastConfig {
            id: BroadcastId::from(id.to_owned()),
            camera_id: CameraId::from("cam-1".to_owned()),
            remote_url: "rtmp://push.example/live/".into(),
            stream_key: "key123".into(),
        }
    }

    #[tokio::test]
    async fn start_declines_without_playlist() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (mut sup, control, _mock) = harness().await;
                let b = broadcast("b-1");
                sup.start(&b, None, &control).await.unwrap();
                assert!(!sup.is_running(&b.id));
                assert!(!sup.failed.contains(&b.id));
            })
            .await;
    }

    #[tokio::test]
    async fn stop_before_start_marks_guard_and_is_a_no_op() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (mut sup, control, _mock) = harness().await;
                let b = broadcast("b-2");
                sup.stop(&b.id, Duration::from_millis(20), &control).await;
                assert!(sup.is_guarded(&b.id));
                assert!(!sup.is_running(&b.id));
            })
            .await;
    }

    #[tokio::test]
    async fn clear_guards_resets_stopping_and_failed() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (mut sup, control, _mock) = harness().await;
                let b = broadcast("b-3");
                sup.stop(&b.id, Duration::from_millis(20), &control).await;
                assert!(sup.is_guarded(&b.id));
                sup.clear_guards(&b.id);
                assert!(!sup.is_guarded(&b.id));
            })
            .await;
    }
}
