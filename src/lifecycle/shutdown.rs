//! Shutdown coordination for the echo server.

use tokio::sync::broadcast;

use crate::lifecycle::signals::TerminationSignals;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Coordinator for shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
/// Subscribe before triggering: late subscribers miss the signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn OS signals into a shutdown.
///
/// The first SIGINT/SIGTERM triggers `shutdown`; a second one exits the
/// process immediately, abandoning any drain in progress.
pub fn spawn_coordinator(
    mut signals: TerminationSignals,
    shutdown: Shutdown,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(signal) = signals.recv().await else {
            return;
        };
        tracing::info!(signal, "Shutting down server...");
        shutdown.trigger();

        if let Some(signal) = signals.recv().await {
            tracing::warn!(signal, "Second signal received, exiting immediately");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}
