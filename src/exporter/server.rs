//! HTTP endpoint host for metrics scraping and health checks.
//!
//! Binding happens synchronously on the caller's thread so port
//! conflicts surface immediately; serving happens on a dedicated thread
//! running a current-thread tokio runtime, shut down through a oneshot
//! channel and joined so the port is released promptly.

use crate::exports::InstanceExportsRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur while starting the endpoint host.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("failed to start endpoint runtime: {0}")]
    Runtime(String),
}

/// Bound HTTP listener serving `/metrics` and `/health`.
///
/// Both routes are registered explicitly at bind time; there is no
/// separate attach step that could fail afterwards.
pub struct EndpointHost {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EndpointHost {
    /// Binds `0.0.0.0:port` and starts serving scrape and health requests.
    pub fn bind(port: u16, exports: Arc<InstanceExportsRegistry>) -> Result<Self, EndpointError> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EndpointError::Runtime(e.to_string()))?;

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(exports);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!(error = %e, "Unable to adopt metrics listener");
                        return;
                    }
                };
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                });
                if let Err(e) = serve.await {
                    tracing::warn!(error = %e, "Metrics endpoint exited with error");
                }
            });
        });

        tracing::info!(addr = %local_addr, "Metrics endpoint listening");

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops serving and waits for the listener to close.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Metrics endpoint thread panicked during shutdown");
            }
        }
    }
}

impl Drop for EndpointHost {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handler for the `/metrics` endpoint.
async fn metrics_handler(
    State(exports): State<Arc<InstanceExportsRegistry>>,
) -> impl IntoResponse {
    match exports.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Payload served by the health endpoint.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: u16,
}

/// Handler for the `/health` endpoint.
///
/// Fixed success payload; never consults registry contents.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: 200 })
}
