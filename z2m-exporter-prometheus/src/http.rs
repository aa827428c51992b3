//! HTTP front end for the metrics registry.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ExporterError;
use crate::exposition;
use crate::registry::SharedRegistry;

/// Check that a metrics path is served literally by the router.
pub fn validate_metrics_path(path: &str) -> Result<(), ExporterError> {
    let reason = if !path.starts_with('/') {
        "must start with /"
    } else if path.contains([':', '*', '{', '}']) {
        "must not contain ':', '*', '{' or '}'"
    } else {
        return Ok(());
    };

    Err(ExporterError::InvalidPath {
        path: path.to_string(),
        reason,
    })
}

/// Create the HTTP router.
///
/// Only `GET`/`HEAD` on the exact metrics path are served; anything else is
/// an empty 404. The path must pass [`validate_metrics_path`].
pub fn create_router(registry: SharedRegistry, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<SharedRegistry>) -> Response {
    let body = registry.collect();

    (
        StatusCode::OK,
        [(CONTENT_TYPE, exposition::CONTENT_TYPE)],
        body,
    )
        .into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

struct RunningServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

/// Serves a registry over HTTP on a single socket.
///
/// `start()` and `stop()` may be called repeatedly; the socket is fully
/// released before `stop()` returns.
pub struct MetricsExporter {
    registry: SharedRegistry,
    listen: SocketAddr,
    path: String,
    server: Option<RunningServer>,
}

impl MetricsExporter {
    pub fn new(registry: SharedRegistry, listen: SocketAddr, path: impl Into<String>) -> Self {
        Self {
            registry,
            listen,
            path: path.into(),
            server: None,
        }
    }

    /// Bind the socket and start serving. Returns the bound address.
    ///
    /// Calling `start()` while listening returns the current address.
    pub async fn start(&mut self) -> Result<SocketAddr, ExporterError> {
        if let Some(server) = &self.server {
            return Ok(server.addr);
        }
        validate_metrics_path(&self.path)?;

        let listener = tokio::net::TcpListener::bind(self.listen)
            .await
            .map_err(|source| ExporterError::Bind {
                addr: self.listen,
                source,
            })?;
        let addr = listener.local_addr().map_err(ExporterError::Serve)?;

        let router = create_router(self.registry.clone(), &self.path);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %addr, path = %self.path, "Metrics endpoint listening");

        self.server = Some(RunningServer {
            addr,
            shutdown,
            handle,
        });
        Ok(addr)
    }

    /// Stop serving and wait until the socket is closed.
    ///
    /// A no-op while stopped.
    pub async fn stop(&mut self) -> Result<(), ExporterError> {
        let Some(server) = self.server.take() else {
            return Ok(());
        };

        let _ = server.shutdown.send(());
        let result = server
            .handle
            .await
            .map_err(|e| ExporterError::Serve(std::io::Error::other(e)))?;

        debug!(addr = %server.addr, "Metrics endpoint closed");
        result.map_err(ExporterError::Serve)
    }

    /// The bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.addr)
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }
}

impl Drop for MetricsExporter {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            let _ = server.shutdown.send(());
        }
    }
}
