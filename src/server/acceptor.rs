//! Accept loop and connection dispatch.
//!
//! # States
//! ```text
//! Listening → Accepting ⇄ Dispatching
//!                 │
//!     shutdown ───┴─→ ShuttingDown → Stopped (listener dropped)
//! ```
//!
//! - Rejected connections are dropped on the spot; no session, no slot
//! - Granted connections get their own task; the loop never waits on it
//! - Accept errors are logged and retried after a short backoff
//! - The shutdown signal is the only way out of the loop

use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::EchoConfig;
use crate::net::{
    load_tls_acceptor, AcceptSource, Admission, AdmissionController, Connection, Listener,
    ListenerError, TlsError,
};
use crate::resilience::backoff::AcceptBackoff;
use crate::security::AdmissionRateLimiter;
use crate::server::session::{run_session, SessionSettings};

/// Fatal errors while bringing the echo listener up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to load TLS certificate and key: {0}")]
    Tls(#[from] TlsError),

    #[error("unable to bind listener: {0}")]
    Listener(#[from] ListenerError),
}

/// Counts reported when the accept loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcceptorSummary {
    pub accepted: u64,
    pub rejected: u64,
    pub accept_errors: u64,
}

/// TLS echo server: listener, credentials and admission control.
pub struct EchoServer {
    listener: Listener,
    tls: TlsAcceptor,
    admission: AdmissionController,
    settings: SessionSettings,
}

impl EchoServer {
    /// Load credentials and bind the listener described by `config`.
    pub async fn bind(config: &EchoConfig) -> Result<Self, ServerError> {
        let tls = load_tls_acceptor(
            Path::new(&config.tls.cert_path),
            Path::new(&config.tls.key_path),
        )?;
        let listener = Listener::bind(&config.listener).await?;

        let admission = AdmissionController::new(
            config.listener.max_connections,
            AdmissionRateLimiter::from_config(&config.rate_limit),
        );

        Ok(Self {
            listener,
            tls,
            admission,
            settings: SessionSettings::from_config(&config.listener),
        })
    }

    /// Get the local address this server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Handle to the admission controller shared with running sessions.
    pub fn admission(&self) -> AdmissionController {
        self.admission.clone()
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Sessions already running are left alone; the listener is closed
    /// before this returns.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> AcceptorSummary {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(address = %addr, "Accepting TLS connections");
        }

        accept_loop(self.listener, self.tls, self.admission, self.settings, shutdown).await
    }
}

/// Pull connections from `source` and dispatch them until `shutdown` fires.
async fn accept_loop<A: AcceptSource>(
    source: A,
    tls: TlsAcceptor,
    admission: AdmissionController,
    settings: SessionSettings,
    mut shutdown: broadcast::Receiver<()>,
) -> AcceptorSummary {
    let mut backoff = AcceptBackoff::default();
    let mut summary = AcceptorSummary::default();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = source.accept_connection() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                backoff.reset();
                summary.accepted += 1;
                if !dispatch(&admission, &tls, &settings, stream, peer_addr) {
                    summary.rejected += 1;
                }
            }
            Err(e) => {
                summary.accept_errors += 1;
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    consecutive_failures = backoff.consecutive_failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Unable to accept connection"
                );
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    drop(source);
    tracing::info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        accept_errors = summary.accept_errors,
        active_sessions = admission.active_count(),
        "Listener closed, acceptor stopped"
    );
    summary
}

/// Admit or refuse one connection. Returns `false` when refused.
fn dispatch(
    admission: &AdmissionController,
    tls: &TlsAcceptor,
    settings: &SessionSettings,
    stream: TcpStream,
    peer_addr: SocketAddr,
) -> bool {
    match admission.try_admit() {
        Admission::Rejected(reason) => {
            drop(stream);
            tracing::info!(
                peer_addr = %peer_addr,
                reason = %reason,
                max_connections = admission.max_connections(),
                "Connection refused"
            );
            false
        }
        Admission::Granted(slot) => {
            let connection = Connection::new(stream, peer_addr, slot);
            let span = tracing::info_span!(
                "session",
                connection_id = %connection.id(),
                peer_addr = %peer_addr
            );
            tracing::debug!(
                parent: &span,
                active = admission.active_count(),
                "Connection admitted"
            );
            tokio::spawn(run_session(connection, tls.clone(), settings.clone()).instrument(span));
            true
        }
    }
}
