//! TCP reachability pre-check used before restarting a camera's ingest.
//!
//! Suppresses pointless spawn attempts (and retry-budget burn) while a
//! camera is simply powered off or unreachable on the network.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default RTSP port assumed when the source URL did not specify one.
pub use crate::url_creds::DEFAULT_RTSP_PORT;

/// Timeout for the reachability probe.
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts a bounded TCP connect to `host:port`. Returns `true` if a
/// connection was established before [`REACHABILITY_TIMEOUT`] elapsed.
pub async fn is_reachable(host: &str, port: u16) -> bool {
    let addr = format!("{host}:{port}");
    matches!(
        timeout(REACHABILITY_TIMEOUT, TcpStream::connect(&addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod reachability_spec {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reachable_host_returns_true() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _accept = tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        assert!(is_reachable(&addr.ip().to_string(), addr.port()).await);
    }

    #[tokio::test]
    async fn closed_port_returns_false() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(!is_reachable(&addr.ip().to_string(), addr.port()).await);
    }
}
