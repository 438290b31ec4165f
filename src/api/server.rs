//! Scan API server lifecycle.
//!
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::scan_api_router;
use crate::api::types::ApiContext;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind scan API server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to get server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Metadata for a running server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub server_addr: String,
    pub port: u16,
    pub started_at: String,
}

/// Handle to a running scan API server.
pub struct ScanApiServer {
    pub info: ServerInfo,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ScanApiServer {
    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Scan API server shutdown signal sent");
        }
    }

    /// Wait until the server task has finished.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Scan API server task failed: {e}");
            }
        }
    }
}

/// Start the scan API on `addr` (port 0 picks an ephemeral port).
pub async fn start_server_on(
    ctx: ApiContext,
    addr: SocketAddr,
) -> Result<ScanApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = scan_api_router(ctx);

    let info = ServerInfo {
        server_addr: addr.to_string(),
        port: addr.port(),
        started_at: chrono::Utc::now().to_rfc3339(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Scan API server received shutdown signal");
        };

        tracing::info!(%addr, "Scan API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Scan API server error: {e}");
        }

        tracing::info!("Scan API server stopped");
    });

    Ok(ScanApiServer {
        info,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    use crate::blob::MemoryBlobStore;
    use crate::db::open_memory_database;
    use crate::scans::ScanService;

    fn test_ctx() -> ApiContext {
        let scans = ScanService::new(
            Arc::new(MemoryBlobStore::new()),
            open_memory_database().unwrap(),
        );
        ApiContext::new(Arc::new(scans), 1024 * 1024)
    }

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let mut server = start_server_on(test_ctx(), localhost())
            .await
            .expect("server should start");
        assert!(server.info.port > 0);

        let url = format!("http://127.0.0.1:{}/api/health", server.info.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "ok");

        server.shutdown();
        server.stopped().await;
        assert!(reqwest::get(&url).await.is_err());
    }

    #[tokio::test]
    async fn multipart_upload_over_http() {
        let mut server = start_server_on(test_ctx(), localhost()).await.unwrap();
        let base = format!("http://127.0.0.1:{}", server.info.port);

        let png = crate::leaf::preprocess::tests::make_test_image(10, 10, [0, 180, 0]);
        let part = reqwest::multipart::Part::bytes(png)
            .file_name("field photo.png")
            .mime_str("image/png")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("image", part);

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{base}/api/upload-scan"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert!(json["imageKey"]
            .as_str()
            .unwrap()
            .ends_with("-field_photo.png"));

        server.shutdown();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let mut first = start_server_on(test_ctx(), localhost()).await.unwrap();
        let taken = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), first.info.port);
        let err = start_server_on(test_ctx(), taken).await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown();
    }
}
