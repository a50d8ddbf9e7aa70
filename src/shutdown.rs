//! Shutdown coordination
//!
//! ## Sequence
//!
//! ```text
//! termination future resolves
//!   → trigger shutdown (listener stops accepting, idle connections close)
//!   → wait for in-flight messages to finish
//!   → request final snapshot report (best-effort)
//!   → close the listening socket
//! ```
//!
//! Connections only observe shutdown while waiting for the next message, so
//! a message that is already being processed always completes.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::report::{ReportHandle, SnapshotReporter};
use crate::server::IngestionServer;

/// Sending half of a shutdown channel
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of a shutdown channel, cloned into every task
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was triggered or the trigger was dropped.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

/// What happened during a coordinated shutdown
#[derive(Debug)]
pub struct ShutdownOutcome {
    /// Connections accepted and drained by the server
    pub connections: usize,

    /// Final report, if one was requested and produced
    pub report: Option<ReportHandle>,
}

pub struct ShutdownCoordinator {
    reporter: Option<Arc<dyn SnapshotReporter>>,
}

impl ShutdownCoordinator {
    pub fn new(reporter: Option<Arc<dyn SnapshotReporter>>) -> Self {
        Self { reporter }
    }

    /// Serve until `termination` resolves, then shut down gracefully.
    #[instrument(skip_all)]
    pub async fn run_until<F>(&self, mut server: IngestionServer, termination: F) -> ShutdownOutcome
    where
        F: Future<Output = ()> + Send,
    {
        let (trigger, signal) = channel();

        let (connections, ()) = tokio::join!(server.serve(signal), async move {
            termination.await;
            info!("termination requested, draining connections");
            trigger.trigger();
        });

        info!("drained {connections} connections");

        let report = self.request_report().await;

        server.close();

        ShutdownOutcome {
            connections,
            report,
        }
    }

    async fn request_report(&self) -> Option<ReportHandle> {
        let reporter = self.reporter.as_ref()?;

        match reporter.generate_snapshot_report().await {
            Ok(handle) => {
                info!("final snapshot report: {}", handle.path.display());
                Some(handle)
            }
            Err(e) => {
                error!("failed to generate final snapshot report: {e}");
                None
            }
        }
    }
}
