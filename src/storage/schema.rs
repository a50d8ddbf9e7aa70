//! Logical tables and row definitions
//!
//! ## Tables
//!
//! | table              | key                                 |
//! |--------------------|-------------------------------------|
//! | `climate_data`     | auto-increment id + timestamp       |
//! | `irrigation_data`  | auto-increment id + timestamp       |
//! | `plant_data`       | auto-increment id + timestamp       |
//! | `derived_metrics`  | (zone, species, timestamp)          |
//! | `critical_alerts`  | (zone, species, kind, timestamp)    |
//!
//! Every table is append-only. Nothing in the pipeline updates or
//! deduplicates rows; sending the same snapshot twice stores it twice.
//!
//! ## Optional columns
//!
//! `critical_alerts.resolved` is not part of the base schema. Operators may
//! add it to track alert resolution; readers probe for it with
//! [`StorageBackend::query_column_exists`](super::StorageBackend::query_column_exists)
//! instead of assuming it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::Alert;
use crate::{ClimateReading, IrrigationReading, PlantReading};

pub const CLIMATE_TABLE: &str = "climate_data";
pub const IRRIGATION_TABLE: &str = "irrigation_data";
pub const PLANT_TABLE: &str = "plant_data";
pub const DERIVED_METRICS_TABLE: &str = "derived_metrics";
pub const ALERT_TABLE: &str = "critical_alerts";

/// Optional resolution-tracking column on [`ALERT_TABLE`]
pub const RESOLVED_COLUMN: &str = "resolved";

/// Columns every deployment has, per table.
pub fn base_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        CLIMATE_TABLE => Some(&[
            "id",
            "zone",
            "temperature",
            "humidity",
            "co2",
            "light_intensity",
            "pressure",
            "timestamp",
        ]),
        IRRIGATION_TABLE => Some(&[
            "id",
            "system",
            "ph",
            "conductivity",
            "flow",
            "reservoir_level",
            "historical_flow",
            "timestamp",
        ]),
        PLANT_TABLE => Some(&[
            "id",
            "species",
            "growth",
            "fruit_count",
            "fruit_quality",
            "health_level",
            "timestamp",
        ]),
        DERIVED_METRICS_TABLE => Some(&[
            "id",
            "zone",
            "species",
            "stress_index",
            "fruit_yield",
            "light_efficiency",
            "irrigation_needed",
            "nutrition_advice",
            "timestamp",
        ]),
        ALERT_TABLE => Some(&["id", "zone", "species", "kind", "timestamp"]),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRow {
    pub id: i64,
    pub zone: String,
    pub reading: ClimateReading,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationRow {
    pub id: i64,
    pub system: String,
    pub reading: IrrigationReading,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRow {
    pub id: i64,
    pub species: String,
    pub reading: PlantReading,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: i64,
    pub alert: Alert,

    /// `None` when the deployment does not track resolution
    pub resolved: Option<bool>,
}
