//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait, the persistence gateway
//! the ingestion server writes through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{AlertRow, ClimateRow, IrrigationRow, PlantRow};
use crate::engine::{Alert, DerivedMetrics};
use crate::{ClimateReading, IrrigationReading, PlantReading};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// ## Write contract
///
/// All `append_*` methods insert exactly one row and never update or
/// deduplicate. A backend that cannot be reached returns
/// [`StorageError::Unavailable`](super::StorageError::Unavailable); the
/// caller logs it and moves on to the next record.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`. One backend instance is shared by
/// every connection task, so it is responsible for safe concurrent use
/// (pooling or internal locking).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Append a raw climate reading for a zone
    async fn append_climate(
        &self,
        zone: &str,
        reading: &ClimateReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Append a raw irrigation reading for an irrigation system
    async fn append_irrigation(
        &self,
        system: &str,
        reading: &IrrigationReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Append a raw plant reading for a species
    async fn append_plant(
        &self,
        species: &str,
        reading: &PlantReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Append the indicators of one (zone, species) pair
    async fn append_derived_metrics(&self, metrics: &DerivedMetrics) -> StorageResult<()>;

    /// Append one raised alert
    async fn append_alert(&self, alert: &Alert) -> StorageResult<()>;

    /// Check whether an optional column exists
    ///
    /// Used to detect schema extensions (such as the alert `resolved`
    /// column) without failing when they are absent.
    async fn query_column_exists(&self, table: &str, column: &str) -> StorageResult<bool>;

    /// Raw climate rows recorded at or after `since`, oldest first
    async fn query_climate_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<ClimateRow>>;

    /// Raw irrigation rows recorded at or after `since`, oldest first
    async fn query_irrigation_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<IrrigationRow>>;

    /// Raw plant rows recorded at or after `since`, oldest first
    async fn query_plants_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<PlantRow>>;

    /// Derived metrics computed at or after `since`, oldest first
    async fn query_derived_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DerivedMetrics>>;

    /// Alerts raised at or after `since`, oldest first
    async fn query_alerts_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<AlertRow>>;

    /// Most recent alerts, newest first
    ///
    /// When the deployment tracks resolution only unresolved alerts are
    /// returned, otherwise every alert counts as active.
    async fn query_active_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRow>>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Get backend-specific statistics
    ///
    /// Returns human-readable stats about the backend
    /// (e.g., "SQLite: 1200 climate rows, ...").
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
