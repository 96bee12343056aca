//! Process-level configuration (§10.3), parsed from the environment.

use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

/// Command-line/environment configuration for the supervisor binary.
#[derive(Debug, StructOpt)]
#[structopt(name = "edge-supervisor", about = "RTSP ingest and RTMP fan-out supervisor for an edge device")]
pub struct Opts {
    /// Base URL of the control plane API (e.g. `https://api.example.com`).
    #[structopt(long, env = "CONTROL_PLANE_URL", validator = validate_absolute_url)]
    pub control_plane_url: String,

    /// Device id this supervisor authenticates as.
    #[structopt(long, env = "DEVICE_ID")]
    pub device_id: String,

    /// Device token, given inline. Mutually usable with `--device-token-file`;
    /// if both are set the file wins.
    #[structopt(long, env = "DEVICE_TOKEN", hide_env_values = true)]
    pub device_token: Option<String>,

    /// Path to a file containing the device token, loaded at startup (§11).
    #[structopt(long, env = "DEVICE_TOKEN_FILE", parse(from_os_str))]
    pub device_token_file: Option<PathBuf>,

    /// Public base URL under which signed HLS playlists are reachable.
    #[structopt(long, env = "PUBLIC_BASE_URL", validator = validate_absolute_url)]
    pub public_base_url: String,

    /// Local directory under which per-camera HLS segment directories are
    /// created. Created at startup if missing; failure to do so is fatal.
    #[structopt(long, env = "HLS_ROOT", parse(from_os_str))]
    pub hls_root: PathBuf,

    /// Path to the transcoder (`ffmpeg`-compatible) binary.
    #[structopt(long, env = "TRANSCODER_PATH", parse(from_os_str))]
    pub transcoder_path: PathBuf,

    /// HMAC secret used to sign public HLS URLs.
    #[structopt(long, env = "URL_SIGNING_SECRET", hide_env_values = true)]
    pub url_signing_secret: String,

    /// How often the declared state is re-fetched and diffed.
    #[structopt(long, env = "SYNC_INTERVAL", default_value = "30s", parse(try_from_str = humantime::parse_duration))]
    pub sync_interval: Duration,

    /// How often a running ingest's connection status is reported.
    #[structopt(long, env = "CONNECTION_HEARTBEAT_INTERVAL", default_value = "10s", parse(try_from_str = humantime::parse_duration))]
    pub connection_heartbeat_interval: Duration,

    /// How often a running broadcast's status is reported.
    #[structopt(long, env = "BROADCAST_HEARTBEAT_INTERVAL", default_value = "30s", parse(try_from_str = humantime::parse_duration))]
    pub broadcast_heartbeat_interval: Duration,

    /// How often a running ingest's public URL is re-signed and republished.
    #[structopt(long, env = "URL_REFRESH_INTERVAL", default_value = "6h", parse(try_from_str = humantime::parse_duration))]
    pub url_refresh_interval: Duration,

    /// Validity window of a freshly signed public URL.
    #[structopt(long, env = "URL_EXPIRY", default_value = "12h", parse(try_from_str = humantime::parse_duration))]
    pub url_expiry: Duration,

    /// Number of HLS segments retained per camera (the DVR window).
    #[structopt(long, env = "DVR_WINDOW_SEGMENTS", default_value = "120")]
    pub dvr_window_segments: u32,

    /// Grace period given to a process after a stop signal before it is
    /// force-killed.
    #[structopt(long, env = "SHUTDOWN_GRACE", default_value = "3s", parse(try_from_str = humantime::parse_duration))]
    pub shutdown_grace: Duration,
}

/// Rejects anything `url::Url` would not accept as an absolute URL, so a
/// typo'd base URL is caught at startup rather than on the first outbound
/// request.
fn validate_absolute_url(value: String) -> Result<(), String> {
    url::Url::parse(&value)
        .map(|_| ())
        .map_err(|e| format!("not a valid URL: {}", e))
}

impl Opts {
    /// Resolves the device token, preferring `--device-token-file` when set.
    pub fn load_device_token(&self) -> Result<String, crate::error::Failure> {
        if let Some(path) = &self.device_token_file {
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_owned())
                .map_err(|e| crate::error::Failure::Config(format!("failed to read device token file {}: {}", path.display(), e)));
        }
        self.device_token
            .clone()
            .ok_or_else(|| crate::error::Failure::Config("neither --device-token nor --device-token-file was set".to_owned()))
    }
}

#[cfg(test)]
mod cli_spec {
    use super::*;

    #[test]
    fn load_device_token_prefers_file_over_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "from-file\n").unwrap();

        let opts = Opts {
            control_plane_url: "https://example.com".to_owned(),
            device_id: "dev-1".to_owned(),
            device_token: Some("inline".to_owned()),
            device_token_file: Some(path),
            public_base_url: "https://edge.example".to_owned(),
            hls_root: dir.path().to_path_buf(),
            transcoder_path: PathBuf::from("/usr/bin/ffmpeg"),
            url_signing_secret: "secret".to_owned(),
            sync_interval: Duration::from_secs(30),
            connection_heartbeat_interval: Duration::from_secs(10),
            broadcast_heartbeat_interval: Duration::from_secs(30),
            url_refresh_interval: Duration::from_secs(6 * 3600),
            url_expiry: Duration::from_secs(12 * 3600),
            dvr_window_segments: 120,
            shutdown_grace: Duration::from_secs(3),
        };

        assert_eq!(opts.load_device_token().unwrap(), "from-file");
    }

    #[test]
    fn load_device_token_fails_when_neither_is_set() {
        let opts = Opts {
            control_plane_url: "https://example.com".to_owned(),
            device_id: "dev-1".to_owned(),
            device_token: None,
            device_token_file: None,
            public_base_url: "https://edge.example".to_owned(),
            hls_root: PathBuf::from("/tmp/hls"),
            transcoder_path: PathBuf::from("/usr/bin/ffmpeg"),
            url_signing_secret: "secret".to_owned(),
            sync_interval: Duration::from_secs(30),
            connection_heartbeat_interval: Duration::from_secs(10),
            broadcast_heartbeat_interval: Duration::from_secs(30),
            url_refresh_interval: Duration::from_secs(6 * 3600),
            url_expiry: Duration::from_secs(12 * 3600),
            dvr_window_segments: 120,
            shutdown_grace: Duration::from_secs(3),
        };

        assert!(opts.load_device_token().is_err());
    }
}
