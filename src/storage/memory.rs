//! In-memory storage backend (no persistence)
//!
//! This backend keeps every table in a `Vec` behind a single async lock.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the pipeline without a database (`backend = "none"`)
//!
//! It also supports simulating schema extensions ([`MemoryBackend::add_column`])
//! and per-table outages ([`MemoryBackend::set_unavailable`]).
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Rows are never evicted

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    ALERT_TABLE, AlertRow, CLIMATE_TABLE, ClimateRow, DERIVED_METRICS_TABLE, IRRIGATION_TABLE,
    IrrigationRow, PLANT_TABLE, PlantRow, RESOLVED_COLUMN, base_columns,
};
use crate::engine::{Alert, DerivedMetrics};
use crate::{ClimateReading, IrrigationReading, PlantReading};

/// Number of rows per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub climate: usize,
    pub irrigation: usize,
    pub plants: usize,
    pub derived: usize,
    pub alerts: usize,
}

impl RecordCounts {
    pub fn raw(&self) -> usize {
        self.climate + self.irrigation + self.plants
    }
}

#[derive(Debug, Default)]
struct Tables {
    climate: Vec<ClimateRow>,
    irrigation: Vec<IrrigationRow>,
    plants: Vec<PlantRow>,
    derived: Vec<DerivedMetrics>,
    alerts: Vec<AlertRow>,

    last_id: i64,

    /// Columns added on top of the base schema, per table
    extra_columns: HashMap<String, HashSet<String>>,

    /// Tables currently refusing writes
    unavailable: HashSet<String>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn ensure_available(&self, table: &str) -> StorageResult<()> {
        if self.unavailable.contains(table) {
            return Err(StorageError::Unavailable(format!(
                "table {table} is unavailable"
            )));
        }
        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.extra_columns
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional column to a table.
    ///
    /// Adding [`RESOLVED_COLUMN`] to the alert table marks all existing
    /// alerts as unresolved, like an `ALTER TABLE ... DEFAULT FALSE` would.
    pub async fn add_column(&self, table: &str, column: &str) -> StorageResult<()> {
        if base_columns(table).is_none() {
            return Err(StorageError::UnknownTable(table.to_string()));
        }

        let mut tables = self.tables.write().await;
        tables
            .extra_columns
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());

        if table == ALERT_TABLE && column == RESOLVED_COLUMN {
            for row in tables.alerts.iter_mut() {
                row.resolved.get_or_insert(false);
            }
        }

        Ok(())
    }

    /// Mark an alert as resolved. Returns `false` when the alert does not
    /// exist or the deployment does not track resolution.
    pub async fn resolve_alert(&self, id: i64) -> bool {
        let mut tables = self.tables.write().await;
        match tables.alerts.iter_mut().find(|row| row.id == id) {
            Some(row) if row.resolved.is_some() => {
                row.resolved = Some(true);
                true
            }
            _ => false,
        }
    }

    /// Make writes to a table fail with [`StorageError::Unavailable`].
    pub async fn set_unavailable(&self, table: &str, unavailable: bool) {
        let mut tables = self.tables.write().await;
        if unavailable {
            tables.unavailable.insert(table.to_string());
        } else {
            tables.unavailable.remove(table);
        }
    }

    pub async fn counts(&self) -> RecordCounts {
        let tables = self.tables.read().await;
        RecordCounts {
            climate: tables.climate.len(),
            irrigation: tables.irrigation.len(),
            plants: tables.plants.len(),
            derived: tables.derived.len(),
            alerts: tables.alerts.len(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn append_climate(
        &self,
        zone: &str,
        reading: &ClimateReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_available(CLIMATE_TABLE)?;

        let id = tables.next_id();
        tables.climate.push(ClimateRow {
            id,
            zone: zone.to_string(),
            reading: reading.clone(),
            timestamp: at,
        });
        Ok(())
    }

    async fn append_irrigation(
        &self,
        system: &str,
        reading: &IrrigationReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_available(IRRIGATION_TABLE)?;

        let id = tables.next_id();
        tables.irrigation.push(IrrigationRow {
            id,
            system: system.to_string(),
            reading: reading.clone(),
            timestamp: at,
        });
        Ok(())
    }

    async fn append_plant(
        &self,
        species: &str,
        reading: &PlantReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_available(PLANT_TABLE)?;

        let id = tables.next_id();
        tables.plants.push(PlantRow {
            id,
            species: species.to_string(),
            reading: reading.clone(),
            timestamp: at,
        });
        Ok(())
    }

    async fn append_derived_metrics(&self, metrics: &DerivedMetrics) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_available(DERIVED_METRICS_TABLE)?;
        tables.derived.push(metrics.clone());
        Ok(())
    }

    async fn append_alert(&self, alert: &Alert) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.ensure_available(ALERT_TABLE)?;

        let id = tables.next_id();
        let resolved = tables
            .has_column(ALERT_TABLE, RESOLVED_COLUMN)
            .then_some(false);
        tables.alerts.push(AlertRow {
            id,
            alert: alert.clone(),
            resolved,
        });
        Ok(())
    }

    async fn query_column_exists(&self, table: &str, column: &str) -> StorageResult<bool> {
        let Some(columns) = base_columns(table) else {
            return Ok(false);
        };

        let tables = self.tables.read().await;
        Ok(columns.contains(&column) || tables.has_column(table, column))
    }

    async fn query_climate_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<ClimateRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .climate
            .iter()
            .filter(|row| row.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.timestamp, row.id));
        Ok(rows)
    }

    async fn query_irrigation_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<IrrigationRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .irrigation
            .iter()
            .filter(|row| row.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.timestamp, row.id));
        Ok(rows)
    }

    async fn query_plants_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<PlantRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .plants
            .iter()
            .filter(|row| row.timestamp >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.timestamp, row.id));
        Ok(rows)
    }

    async fn query_derived_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DerivedMetrics>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .derived
            .iter()
            .filter(|row| row.computed_at >= since)
            .cloned()
            .collect();
        // stable, so equal timestamps keep insertion order
        rows.sort_by_key(|row| row.computed_at);
        Ok(rows)
    }

    async fn query_alerts_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<AlertRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .alerts
            .iter()
            .filter(|row| row.alert.raised_at >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.alert.raised_at, row.id));
        Ok(rows)
    }

    async fn query_active_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRow>> {
        let tracks_resolution = self
            .query_column_exists(ALERT_TABLE, RESOLVED_COLUMN)
            .await?;

        debug!("querying {limit} active alerts (resolution tracked: {tracks_resolution})");

        let tables = self.tables.read().await;
        let mut rows: Vec<&AlertRow> = tables
            .alerts
            .iter()
            .filter(|row| !tracks_resolution || row.resolved == Some(false))
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse((row.alert.raised_at, row.id)));
        Ok(rows.into_iter().take(limit).cloned().collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let counts = self.counts().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("raw_records".to_string(), counts.raw().to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let counts = self.counts().await;
        Ok(format!(
            "In-Memory: {} climate, {} irrigation, {} plant, {} derived, {} alert rows",
            counts.climate, counts.irrigation, counts.plants, counts.derived, counts.alerts
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
