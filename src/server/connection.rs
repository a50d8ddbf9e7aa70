//! One producer connection
//!
//! ```text
//! AwaitingMessage ──read──▶ Parsing ──ok──▶ Processing ──▶ AwaitingMessage
//!        │                     │
//!        │                     └─malformed─▶ AwaitingMessage
//!        └─EOF / I/O error / shutdown──▶ Closed
//! ```
//!
//! Each read is treated as one message. Shutdown is only observed in
//! `AwaitingMessage`; a message in `Processing` always runs to completion.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, instrument, trace, warn};

use super::pipeline::{ProcessingReport, process_snapshot};
use crate::codec::{self, TelemetrySnapshot};
use crate::engine::AnomalySource;
use crate::shutdown::ShutdownSignal;
use crate::storage::StorageBackend;

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CloseReason {
    /// Peer closed the stream
    #[default]
    PeerClosed,

    /// Shutdown was requested while waiting for a message
    Shutdown,

    /// Reading from the stream failed
    Io(String),
}

/// Outcome of one connection task
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSummary {
    pub connection: u64,
    pub messages_processed: usize,
    pub malformed_messages: usize,

    /// Messages whose processing panicked
    pub failed_messages: usize,

    /// Per-record storage failures across all messages
    pub storage_failures: usize,

    pub close_reason: CloseReason,
}

enum ConnectionState {
    AwaitingMessage,
    Parsing(usize),
    Processing(TelemetrySnapshot),
    Closed(CloseReason),
}

/// Everything a connection task owns
pub struct ConnectionContext {
    id: u64,
    peer: SocketAddr,
    store: Arc<dyn StorageBackend>,
    anomalies: Box<dyn AnomalySource>,
    buffer_size: usize,
}

impl ConnectionContext {
    pub fn new(
        id: u64,
        peer: SocketAddr,
        store: Arc<dyn StorageBackend>,
        anomalies: Box<dyn AnomalySource>,
        buffer_size: usize,
    ) -> Self {
        Self {
            id,
            peer,
            store,
            anomalies,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Process messages until the stream closes, fails or shutdown is requested.
    #[instrument(skip_all, fields(connection = self.id, peer = %self.peer))]
    pub async fn serve<S>(mut self, mut stream: S, mut shutdown: ShutdownSignal) -> ConnectionSummary
    where
        S: AsyncRead + Unpin + Send,
    {
        debug!("connection opened");

        let mut buffer = vec![0u8; self.buffer_size];
        let mut summary = ConnectionSummary {
            connection: self.id,
            ..Default::default()
        };
        let mut state = ConnectionState::AwaitingMessage;

        loop {
            state = match state {
                ConnectionState::AwaitingMessage => {
                    tokio::select! {
                        biased;
                        _ = shutdown.triggered() => {
                            ConnectionState::Closed(CloseReason::Shutdown)
                        }
                        read = stream.read(&mut buffer) => match read {
                            Ok(0) => ConnectionState::Closed(CloseReason::PeerClosed),
                            Ok(len) => ConnectionState::Parsing(len),
                            Err(e) => {
                                warn!("read failed: {e}");
                                ConnectionState::Closed(CloseReason::Io(e.to_string()))
                            }
                        }
                    }
                }

                ConnectionState::Parsing(len) => {
                    trace!("received {len} bytes");
                    match codec::parse(&buffer[..len]) {
                        Ok(snapshot) => ConnectionState::Processing(snapshot),
                        Err(e) => {
                            warn!("skipping message: {e}");
                            summary.malformed_messages += 1;
                            ConnectionState::AwaitingMessage
                        }
                    }
                }

                ConnectionState::Processing(snapshot) => {
                    match self.process(&snapshot).await {
                        Ok(report) => {
                            summary.messages_processed += 1;
                            summary.storage_failures += report.failures();
                        }
                        Err(message) => {
                            error!("unexpected failure while processing message: {message}");
                            summary.failed_messages += 1;
                        }
                    }
                    ConnectionState::AwaitingMessage
                }

                ConnectionState::Closed(reason) => {
                    summary.close_reason = reason;
                    break;
                }
            };
        }

        debug!("connection closed: {:?}", summary.close_reason);
        summary
    }

    /// Run the pipeline, turning a panic into an error message.
    async fn process(&mut self, snapshot: &TelemetrySnapshot) -> Result<ProcessingReport, String> {
        AssertUnwindSafe(process_snapshot(
            self.store.as_ref(),
            snapshot,
            self.anomalies.as_mut(),
        ))
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
