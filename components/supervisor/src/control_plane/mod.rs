//! HTTP client for the control plane's consumed API (§6).
//!
//! All four endpoints are authenticated with HTTP Basic (device id as
//! username, device token as password) and exchange JSON bodies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;
use crate::types::{BroadcastId, CameraId};

/// Bounded timeout applied to every outbound call, per §5 ("implementers
/// SHOULD set a reasonable one").
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A camera as declared by the control plane's consolidated snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct DeclaredCamera {
    pub id: CameraId,
    pub name: String,
    pub source_url: String,
    pub has_stream_config: bool,
}

/// A broadcast as declared by the control plane's consolidated snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct DeclaredBroadcast {
    pub id: BroadcastId,
    pub camera_id: CameraId,
    pub remote_url: String,
    pub stream_key: String,
}

/// Device-level metadata carried by the consolidated snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(default)]
    pub public_base_url: Option<String>,
}

/// The consolidated declared-state snapshot (§6, `GET device/state/`).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct DeclaredState {
    pub cameras: Vec<DeclaredCamera>,
    pub broadcasts: Vec<DeclaredBroadcast>,
    pub device: DeviceInfo,
    #[serde(default)]
    pub complex: serde_json::Value,
}

#[derive(Serialize)]
struct ConnectionReport<'a> {
    is_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshUrlReport<'a> {
    local_hls_url: &'a str,
}

#[derive(Serialize)]
struct BroadcastStatusReport<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffmpeg_pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

#[derive(Deserialize)]
struct SuccessEnvelope {
    #[allow(dead_code)]
    success: bool,
}

/// Client for the control plane's device-facing API.
#[derive(Debug)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
    device_token: String,
}

impl ControlPlaneClient {
    /// Builds a client targeting `base_url`, authenticating as `device_id`
    /// with `device_token`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, device_id: impl Into<String>, device_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            device_id: device_id.into(),
            device_token: device_token.into(),
        }
    }

    /// Fetches the consolidated declared-state snapshot.
    pub async fn fetch_state(&self) -> Result<DeclaredState, SupervisorError> {
        let url = format!("{}/api/v1/device/state/", self.base_url);
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.device_id, Some(&self.device_token))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SupervisorError::TransientNetwork(e.to_string()))?;

        Self::json_or_reject(resp).await
    }

    /// Reports an ingest's connection status.
    pub async fn report_connection(
        &self,
        camera_id: &CameraId,
        is_connected: bool,
        error: Option<&str>,
    ) -> Result<(), SupervisorError> {
        let url = format!(
            "{}/api/v1/device/cameras/{}/connection/",
            self.base_url, camera_id
        );
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.device_id, Some(&self.device_token))
            .timeout(REQUEST_TIMEOUT)
            .json(&ConnectionReport { is_connected, error })
            .send()
            .await
            .map_err(|e| SupervisorError::TransientNetwork(e.to_string()))?;

        Self::json_or_reject::<SuccessEnvelope>(resp).await.map(|_| ())
    }

    /// Publishes a freshly signed HLS URL.
    pub async fn refresh_stream_url(
        &self,
        camera_id: &CameraId,
        local_hls_url: &str,
    ) -> Result<(), SupervisorError> {
        let url = format!(
            "{}/api/v1/device/cameras/{}/stream/refresh-url/",
            self.base_url, camera_id
        );
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.device_id, Some(&self.device_token))
            .timeout(REQUEST_TIMEOUT)
            .json(&RefreshUrlReport { local_hls_url })
            .send()
            .await
            .map_err(|e| SupervisorError::TransientNetwork(e.to_string()))?;

        Self::json_or_reject::<SuccessEnvelope>(resp).await.map(|_| ())
    }

    /// Reports a broadcast's status.
    pub async fn report_broadcast_status(
        &self,
        broadcast_id: &BroadcastId,
        status: &str,
        ffmpeg_pid: Option<u32>,
        error_message: Option<&str>,
    ) -> Result<(), SupervisorError> {
        let url = format!(
            "{}/api/v1/device/youtube/broadcasts/{}/status/",
            self.base_url, broadcast_id
        );
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.device_id, Some(&self.device_token))
            .timeout(REQUEST_TIMEOUT)
            .json(&BroadcastStatusReport {
                status,
                ffmpeg_pid,
                error_message,
            })
            .send()
            .await
            .map_err(|e| SupervisorError::TransientNetwork(e.to_string()))?;

        Self::json_or_reject::<SuccessEnvelope>(resp).await.map(|_| ())
    }

    async fn json_or_reject<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> Result<T, SupervisorError> {
        let status = resp.status();
        if status.is_success() {
            resp.json::<T>()
                .await
                .map_err(|e| SupervisorError::TransientNetwork(e.to_string()))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(SupervisorError::RemoteRejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Whether a [`SupervisorError::RemoteRejected`] means "the entity was
/// deleted upstream" per §7 (a bare `404` on a per-entity endpoint).
#[must_use]
pub fn means_deleted(err: &SupervisorError) -> bool {
    matches!(err, SupervisorError::RemoteRejected { status, .. } if *status == 404)
}

/// Retries a per-entity control-plane call up to `attempts` times with
/// linear backoff (`0.5s * attempt`), per §4.4's failure semantics for
/// individual report/status calls. Gives up silently after the last
/// attempt: the next heartbeat cycle re-converges.
pub async fn with_linear_retry<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, SupervisorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SupervisorError>>,
{
    let mut last_err = SupervisorError::Cancelled;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_err = e;
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
            }
        }
    }
    Err(last_err)
}
