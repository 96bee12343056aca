//! Edge stream supervisor: keeps RTSP-to-HLS ingest and HLS-to-RTMP fan-out
//! processes converged on the control plane's declared state.

mod broadcast;
mod camera;
mod cli;
mod clock;
mod control_plane;
mod error;
mod log_ring;
mod reconciler;
mod transcoder;
mod types;
mod url_creds;

use std::rc::Rc;

use structopt::StructOpt;
use tokio_util::sync::CancellationToken;
use edge_log::tracing::{error, info};

use clock::SystemClock;
use control_plane::ControlPlaneClient;
use error::Failure;
use reconciler::{Config, Reconciler};

fn main() {
    edge_log::init(None);

    if let Err(e) = run() {
        error!(error = %e, "fatal startup failure");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let opts = cli::Opts::from_args();
    let device_token = opts.load_device_token()?;

    std::fs::create_dir_all(&opts.hls_root).map_err(Failure::HlsRoot)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Failure::Config(format!("failed to start async runtime: {}", e)))?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        let control = Rc::new(ControlPlaneClient::new(opts.control_plane_url.clone(), opts.device_id.clone(), device_token));
        let clock: Rc<dyn clock::Clock> = Rc::new(SystemClock);

        let config = Config {
            sync_interval: opts.sync_interval,
            connection_heartbeat_interval: opts.connection_heartbeat_interval,
            broadcast_heartbeat_interval: opts.broadcast_heartbeat_interval,
            url_refresh_interval: opts.url_refresh_interval,
            url_expiry: opts.url_expiry,
            shutdown_grace: opts.shutdown_grace,
            hmac_secret: opts.url_signing_secret.into_bytes(),
            public_base_url: Some(opts.public_base_url.clone()),
        };

        let reconciler = Reconciler::new(control, opts.transcoder_path.clone(), opts.hls_root.clone(), opts.dvr_window_segments, config, clock);

        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::task::spawn_local(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received");
            signal_cancel.cancel();
        });

        reconciler.run(cancel).await;
    });

    Ok(())
}

/// Resolves once either `SIGTERM` or `SIGINT` is received, per §10.5.
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}
