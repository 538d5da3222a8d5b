//! TLS Echo Server
//!
//! Accepts TLS connections and writes back exactly the bytes each client
//! sends, with a ceiling on concurrent connections and Prometheus metrics on
//! a separate plaintext endpoint.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 ECHO SERVER                  │
//!                    │                                              │
//!   TLS client ──────┼─▶ listener ──▶ admission ──▶ session task   │
//!              ◀─────┼──────────────────────────────  (echo loop)   │
//!                    │                   │                          │
//!                    │                   ▼                          │
//!   Prometheus ──────┼──────────▶ /metrics (counters, gauge)        │
//!                    │                                              │
//!   SIGINT/SIGTERM ──┼─▶ shutdown ──▶ close listener ──▶ exit       │
//!                    └──────────────────────────────────────────────┘
//! ```

use clap::Parser;

use tls_echo_server::config::{load_from_args, CliArgs};
use tls_echo_server::lifecycle;
use tls_echo_server::observability::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = load_from_args(&args)?;

    init_logging(&config.observability.log_level)?;

    tracing::info!("tls-echo-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        buffer_size = config.listener.buffer_size,
        max_connections = config.listener.max_connections,
        rate_limit_enabled = config.rate_limit.enabled,
        metrics_address = %config.observability.metrics_address,
        "Configuration loaded"
    );

    if let Err(e) = lifecycle::run(config).await {
        tracing::error!(error = %e, "Fatal startup error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
