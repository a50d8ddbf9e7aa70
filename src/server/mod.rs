//! Ingestion server
//!
//! Accepts producer connections on a TCP listener and runs one task per
//! connection. Tasks share nothing but the storage backend; each one owns
//! its [`ConnectionContext`] (including its own anomaly source).
//!
//! ## Shutdown
//!
//! [`IngestionServer::serve`] runs until the [`ShutdownSignal`] fires. It
//! then stops accepting, waits for every connection task to finish its
//! current message, and returns. The listening socket stays bound until
//! [`IngestionServer::close`].

pub mod connection;
pub mod pipeline;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AlertConfig, Config};
use crate::shutdown::ShutdownSignal;
use crate::storage::StorageBackend;

pub use connection::{CloseReason, ConnectionContext, ConnectionSummary};
pub use pipeline::{ProcessingReport, process_snapshot};

/// Pause after a failed accept (e.g. too many open files)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Per-connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub read_buffer_size: usize,
    pub alerts: AlertConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            read_buffer_size: crate::util::get_default_read_buffer_size(),
            alerts: AlertConfig::default(),
        }
    }
}

impl From<&Config> for ServerSettings {
    fn from(config: &Config) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            alerts: config.alerts.clone(),
        }
    }
}

pub struct IngestionServer {
    listener: TcpListener,
    store: Arc<dyn StorageBackend>,
    settings: ServerSettings,
    next_connection: u64,
}

impl IngestionServer {
    /// Bind the listener. Failing to bind is the only fatal server error.
    #[instrument(skip(store, settings))]
    pub async fn bind(
        addr: SocketAddr,
        store: Arc<dyn StorageBackend>,
        settings: ServerSettings,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!("listening on {}", listener.local_addr().unwrap_or(addr));

        Ok(Self {
            listener,
            store,
            settings,
            next_connection: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, then drain them.
    ///
    /// Returns the number of connections accepted (all of them finished).
    #[instrument(skip_all)]
    pub async fn serve(&mut self, mut shutdown: ShutdownSignal) -> usize {
        let mut connections = JoinSet::new();
        let mut accepted = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.triggered() => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    Self::reap(finished);
                }

                incoming = self.listener.accept() => match incoming {
                    Ok((stream, peer)) => {
                        accepted += 1;
                        self.next_connection += 1;
                        let id = self.next_connection;

                        debug!("accepted connection {id} from {peer}");

                        let context = ConnectionContext::new(
                            id,
                            peer,
                            self.store.clone(),
                            Box::new(self.settings.alerts.source_for(id)),
                            self.settings.read_buffer_size,
                        );
                        connections.spawn(context.serve(stream, shutdown.clone()));
                    }
                    Err(e) => {
                        warn!("failed to accept connection: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        if !connections.is_empty() {
            info!("waiting for {} connections to finish", connections.len());
        }
        while let Some(finished) = connections.join_next().await {
            Self::reap(finished);
        }

        accepted
    }

    fn reap(finished: Result<ConnectionSummary, JoinError>) {
        match finished {
            Ok(summary) => info!(
                "connection {} finished ({:?}): {} processed, {} malformed, {} failed, {} storage failures",
                summary.connection,
                summary.close_reason,
                summary.messages_processed,
                summary.malformed_messages,
                summary.failed_messages,
                summary.storage_failures
            ),
            Err(e) => error!("connection task failed: {e}"),
        }
    }

    /// Close the listening socket.
    pub fn close(self) {
        info!("closing listener");
        drop(self.listener);
    }
}
