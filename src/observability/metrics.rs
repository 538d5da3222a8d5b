//! Metrics collection and exposition.
//!
//! # Metrics
//! - `total_connections` (counter): connections admitted since startup
//! - `active_connections` (gauge): currently admitted connections
//! - `rejected_connections` (counter): refused connections by `reason`
//!
//! # Design Decisions
//! - One process-wide Prometheus recorder, installed once
//! - Only the admission controller calls the `record_*` functions
//! - Scrapes are served by a small Axum router on its own listener

use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock, PoisonError};

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::net::RejectReason;

pub const TOTAL_CONNECTIONS: &str = "total_connections";
pub const ACTIVE_CONNECTIONS: &str = "active_connections";
pub const REJECTED_CONNECTIONS: &str = "rejected_connections";

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Error type for metrics setup.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to install metrics recorder: {0}")]
    Recorder(#[from] BuildError),

    #[error("failed to bind metrics endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Install the global Prometheus recorder, or return the existing handle.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }

    let _guard = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    register_initial_values();
    Ok(HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!(TOTAL_CONNECTIONS, "Total number of connections");
    describe_gauge!(ACTIVE_CONNECTIONS, "Number of active connections");
    describe_counter!(
        REJECTED_CONNECTIONS,
        "Connections refused at admission, by reason"
    );
}

/// Publish every series at zero so scrapes see them before any traffic.
fn register_initial_values() {
    counter!(TOTAL_CONNECTIONS).absolute(0);
    gauge!(ACTIVE_CONNECTIONS).set(0.0);
    for reason in [RejectReason::Ceiling, RejectReason::RateLimited] {
        counter!(REJECTED_CONNECTIONS, "reason" => reason.as_str()).absolute(0);
    }
}

/// Record an admitted connection.
pub fn record_admitted() {
    counter!(TOTAL_CONNECTIONS).increment(1);
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

/// Record the end of an admitted connection.
pub fn record_released() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

/// Record a refused connection.
pub fn record_rejected(reason: &'static str) {
    counter!(REJECTED_CONNECTIONS, "reason" => reason).increment(1);
}

/// Plaintext HTTP server exposing `/metrics`.
pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
}

impl MetricsServer {
    /// Bind the metrics endpoint.
    pub async fn bind(addr: SocketAddr, handle: PrometheusHandle) -> Result<Self, MetricsError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MetricsError::Bind { addr, source })?;

        let router = Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(handle)
            .layer(TraceLayer::new_for_http());

        Ok(Self { listener, router })
    }

    /// Get the local address this endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Serve scrapes until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = self.listener.local_addr()?;
        tracing::info!(address = %addr, "Metrics endpoint listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Metrics endpoint stopped");
        Ok(())
    }
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], handle.render())
}
