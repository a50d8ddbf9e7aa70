//! Persistence gateway for raw readings, derived metrics and alerts
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async and shared across connection tasks
//! - **Append-only**: No updates, no deduplication
//!
//! ## Backends
//!
//! - **SQLite** (default, feature `storage-sqlite`): Embedded database
//! - **In-Memory**: No persistence, for testing or `backend = "none"`
//!
//! ## Usage
//!
//! ```no_run
//! use greenhouse_telemetry::config::StorageConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = greenhouse_telemetry::storage::open(&StorageConfig::default()).await?;
//!     println!("{}", store.get_stats().await?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::{error, info};

use crate::config::StorageConfig;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{AlertRow, ClimateRow, IrrigationRow, PlantRow};

/// Open the backend selected by the configuration.
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage (no persistence)");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = sqlite::SqliteBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "SQLite support not compiled in (feature `storage-sqlite`)".to_string(),
        )),
    }
}

/// Log backend statistics. A failing stats query is logged and ignored.
pub async fn log_stats(store: &dyn StorageBackend) -> Option<String> {
    match store.get_stats().await {
        Ok(stats) => {
            info!("{stats}");
            Some(stats)
        }
        Err(e) => {
            error!("failed to read storage stats: {e}");
            None
        }
    }
}
