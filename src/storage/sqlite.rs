//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (reports, dashboards) don't block ingestion writes
//! - **Connection pooling**: One pool shared by every connection task
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds.
//!
//! ## Limitations
//!
//! - **Concurrency**: Writes are serialized by SQLite; `busy_timeout` absorbs contention
//! - **Distributed**: Single-machine only

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    ALERT_TABLE, AlertRow, CLIMATE_TABLE, ClimateRow, DERIVED_METRICS_TABLE, IRRIGATION_TABLE,
    IrrigationRow, PLANT_TABLE, PlantRow, RESOLVED_COLUMN, base_columns,
};
use crate::engine::{Alert, AlertKind, DerivedMetrics, NutritionAdvice};
use crate::{ClimateReading, IrrigationReading, PlantReading};

/// SQLite storage backend
///
/// Stores raw readings, derived metrics and alerts in a local SQLite
/// database file.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent use (WAL mode, busy timeout)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use greenhouse_telemetry::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./greenhouse.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("SQLite connection pool created");

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn climate_row(row: &SqliteRow) -> StorageResult<ClimateRow> {
        Ok(ClimateRow {
            id: row.try_get("id")?,
            zone: row.try_get("zone")?,
            reading: ClimateReading {
                temperature: row.try_get("temperature")?,
                humidity: row.try_get("humidity")?,
                co2: row.try_get("co2")?,
                light_intensity: row.try_get("light_intensity")?,
                pressure: row.try_get("pressure")?,
            },
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn irrigation_row(row: &SqliteRow) -> StorageResult<IrrigationRow> {
        Ok(IrrigationRow {
            id: row.try_get("id")?,
            system: row.try_get("system")?,
            reading: IrrigationReading {
                ph: row.try_get("ph")?,
                conductivity: row.try_get("conductivity")?,
                flow: row.try_get("flow")?,
                reservoir_level: row.try_get("reservoir_level")?,
                historical_flow: row.try_get("historical_flow")?,
            },
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn plant_row(row: &SqliteRow) -> StorageResult<PlantRow> {
        let fruit_count: Option<i64> = row.try_get("fruit_count")?;
        Ok(PlantRow {
            id: row.try_get("id")?,
            species: row.try_get("species")?,
            reading: PlantReading {
                growth: row.try_get("growth")?,
                fruit_count: fruit_count.and_then(|count| u32::try_from(count).ok()),
                fruit_quality: row.try_get("fruit_quality")?,
                health_level: row.try_get("health_level")?,
            },
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn derived_row(row: &SqliteRow) -> StorageResult<DerivedMetrics> {
        let advice: Option<String> = row.try_get("nutrition_advice")?;
        let nutrition_advice = match advice {
            Some(advice) => Some(NutritionAdvice::parse(&advice).ok_or_else(|| {
                StorageError::QueryFailed(format!("unknown nutrition advice '{advice}'"))
            })?),
            None => None,
        };

        Ok(DerivedMetrics {
            zone: row.try_get("zone")?,
            species: row.try_get("species")?,
            stress_index: row.try_get("stress_index")?,
            fruit_yield: row.try_get("fruit_yield")?,
            light_efficiency: row.try_get("light_efficiency")?,
            irrigation_needed: row.try_get("irrigation_needed")?,
            nutrition_advice,
            computed_at: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn alert_row(row: &SqliteRow, tracks_resolution: bool) -> StorageResult<AlertRow> {
        let kind: String = row.try_get("kind")?;
        let kind = AlertKind::parse(&kind)
            .ok_or_else(|| StorageError::QueryFailed(format!("unknown alert kind '{kind}'")))?;

        let resolved = if tracks_resolution {
            row.try_get::<Option<bool>, _>(RESOLVED_COLUMN)?
                .or(Some(false))
        } else {
            None
        };

        Ok(AlertRow {
            id: row.try_get("id")?,
            alert: Alert {
                zone: row.try_get("zone")?,
                species: row.try_get("species")?,
                kind,
                raised_at: Self::millis_to_timestamp(row.try_get("timestamp")?),
            },
            resolved,
        })
    }

    fn alert_columns(tracks_resolution: bool) -> &'static str {
        if tracks_resolution {
            "id, zone, species, kind, timestamp, resolved"
        } else {
            "id, zone, species, kind, timestamp"
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, reading, at))]
    async fn append_climate(
        &self,
        zone: &str,
        reading: &ClimateReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO climate_data (
                zone, temperature, humidity, co2, light_intensity, pressure, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(zone)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.co2)
        .bind(reading.light_intensity)
        .bind(reading.pressure)
        .bind(Self::timestamp_to_millis(&at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, reading, at))]
    async fn append_irrigation(
        &self,
        system: &str,
        reading: &IrrigationReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO irrigation_data (
                system, ph, conductivity, flow, reservoir_level, historical_flow, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(system)
        .bind(reading.ph)
        .bind(reading.conductivity)
        .bind(reading.flow)
        .bind(reading.reservoir_level)
        .bind(reading.historical_flow)
        .bind(Self::timestamp_to_millis(&at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, reading, at))]
    async fn append_plant(
        &self,
        species: &str,
        reading: &PlantReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO plant_data (
                species, growth, fruit_count, fruit_quality, health_level, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(species)
        .bind(reading.growth)
        .bind(reading.fruit_count.map(i64::from))
        .bind(reading.fruit_quality)
        .bind(reading.health_level)
        .bind(Self::timestamp_to_millis(&at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(zone = %metrics.zone, species = %metrics.species))]
    async fn append_derived_metrics(&self, metrics: &DerivedMetrics) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO derived_metrics (
                zone, species, stress_index, fruit_yield, light_efficiency,
                irrigation_needed, nutrition_advice, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metrics.zone)
        .bind(&metrics.species)
        .bind(metrics.stress_index)
        .bind(metrics.fruit_yield)
        .bind(metrics.light_efficiency)
        .bind(metrics.irrigation_needed)
        .bind(metrics.nutrition_advice.map(|advice| advice.as_str()))
        .bind(Self::timestamp_to_millis(&metrics.computed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(zone = %alert.zone, species = %alert.species, kind = %alert.kind))]
    async fn append_alert(&self, alert: &Alert) -> StorageResult<()> {
        // Columns beyond the base schema (e.g. `resolved`) take their defaults.
        sqlx::query(
            r#"
            INSERT INTO critical_alerts (zone, species, kind, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&alert.zone)
        .bind(&alert.species)
        .bind(alert.kind.as_str())
        .bind(Self::timestamp_to_millis(&alert.raised_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_column_exists(&self, table: &str, column: &str) -> StorageResult<bool> {
        if base_columns(table).is_none() {
            return Ok(false);
        }

        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0 > 0)
    }

    #[instrument(skip(self))]
    async fn query_climate_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<ClimateRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, zone, temperature, humidity, co2, light_intensity, pressure, timestamp
            FROM climate_data
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::climate_row).collect()
    }

    #[instrument(skip(self))]
    async fn query_irrigation_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<IrrigationRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, system, ph, conductivity, flow, reservoir_level, historical_flow, timestamp
            FROM irrigation_data
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::irrigation_row).collect()
    }

    #[instrument(skip(self))]
    async fn query_plants_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<PlantRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, species, growth, fruit_count, fruit_quality, health_level, timestamp
            FROM plant_data
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::plant_row).collect()
    }

    #[instrument(skip(self))]
    async fn query_derived_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DerivedMetrics>> {
        let rows = sqlx::query(
            r#"
            SELECT zone, species, stress_index, fruit_yield, light_efficiency,
                   irrigation_needed, nutrition_advice, timestamp
            FROM derived_metrics
            WHERE timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(Self::timestamp_to_millis(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::derived_row).collect()
    }

    #[instrument(skip(self))]
    async fn query_alerts_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<AlertRow>> {
        let tracks_resolution = self
            .query_column_exists(ALERT_TABLE, RESOLVED_COLUMN)
            .await?;

        let sql = format!(
            "SELECT {} FROM critical_alerts WHERE timestamp >= ? ORDER BY timestamp ASC, id ASC",
            Self::alert_columns(tracks_resolution)
        );

        let rows = sqlx::query(&sql)
            .bind(Self::timestamp_to_millis(&since))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::alert_row(row, tracks_resolution))
            .collect()
    }

    #[instrument(skip(self))]
    async fn query_active_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRow>> {
        let tracks_resolution = self
            .query_column_exists(ALERT_TABLE, RESOLVED_COLUMN)
            .await?;

        debug!("querying {limit} active alerts (resolution tracked: {tracks_resolution})");

        let filter = if tracks_resolution {
            "WHERE resolved = 0"
        } else {
            ""
        };

        let sql = format!(
            "SELECT {} FROM critical_alerts {} ORDER BY timestamp DESC, id DESC LIMIT ?",
            Self::alert_columns(tracks_resolution),
            filter
        );

        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Self::alert_row(row, tracks_resolution))
            .collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let mut counts = Vec::new();
        for table in [
            CLIMATE_TABLE,
            IRRIGATION_TABLE,
            PLANT_TABLE,
            DERIVED_METRICS_TABLE,
            ALERT_TABLE,
        ] {
            let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            counts.push(format!("{} {}", row.0, table));
        }

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let file_size_mb = file_size as f64 / 1_000_000.0;

        Ok(format!(
            "SQLite: {} rows, {:.2} MB on disk",
            counts.join(", "),
            file_size_mb
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
