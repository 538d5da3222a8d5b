//! Startup orchestration.
//!
//! # Order
//! 1. Load TLS credentials and bind the echo listener
//! 2. Install the metrics recorder and bind the metrics endpoint
//! 3. Register signal handlers
//! 4. Serve until a termination signal, then optionally drain
//!
//! Any failure before step 4 is fatal.

use std::net::AddrParseError;

use thiserror::Error;

use crate::config::EchoConfig;
use crate::lifecycle::shutdown::{spawn_coordinator, Shutdown};
use crate::lifecycle::signals::TerminationSignals;
use crate::observability::metrics::{install_recorder, MetricsError, MetricsServer};
use crate::server::{EchoServer, ServerError};

/// Fatal errors raised before the server starts serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("invalid metrics address {address:?}: {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("unable to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

/// Run the echo server until SIGINT/SIGTERM.
pub async fn run(config: EchoConfig) -> Result<(), StartupError> {
    let server = EchoServer::bind(&config).await?;

    let metrics_addr = config
        .observability
        .metrics_socket_addr()
        .map_err(|source| StartupError::MetricsAddress {
            address: config.observability.metrics_address.clone(),
            source,
        })?;
    let handle = install_recorder()?;
    let metrics_server = MetricsServer::bind(metrics_addr, handle).await?;

    let signals = TerminationSignals::install().map_err(StartupError::Signals)?;

    let shutdown = Shutdown::new();
    let metrics_shutdown = shutdown.subscribe();
    let acceptor_shutdown = shutdown.subscribe();
    spawn_coordinator(signals, shutdown);

    tokio::spawn(async move {
        if let Err(e) = metrics_server.run(metrics_shutdown).await {
            tracing::error!(error = %e, "Metrics endpoint failed");
        }
    });

    let admission = server.admission();
    server.run(acceptor_shutdown).await;

    if let Some(timeout) = config.shutdown.drain_timeout() {
        let in_flight = admission.active_count();
        tracing::info!(in_flight, timeout_secs = timeout.as_secs(), "Draining sessions");
        if !admission.drain(timeout).await {
            tracing::warn!(
                remaining = admission.active_count(),
                "Drain timed out, abandoning remaining sessions"
            );
        }
    } else if admission.active_count() > 0 {
        tracing::info!(
            abandoned = admission.active_count(),
            "Exiting without draining open sessions"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TlsError;

    #[tokio::test]
    async fn missing_credentials_are_fatal() {
        let mut config = EchoConfig::default();
        config.listener.host = "127.0.0.1".into();
        config.listener.port = 0;
        config.tls.cert_path = "/definitely/missing/server.crt".into();

        let err = run(config).await.unwrap_err();
        assert!(matches!(
            err,
            StartupError::Server(ServerError::Tls(TlsError::CertNotFound(_)))
        ));
    }
}
