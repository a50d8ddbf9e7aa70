//! Derived-metrics engine
//!
//! Combines one zone's climate reading with one species' plant reading (and
//! the snapshot's primary irrigation reading) into [`DerivedMetrics`].
//!
//! ## Absent inputs
//!
//! Each indicator needs a fixed set of raw values. When any of them is
//! missing the indicator is `None` ("unavailable") and the corresponding
//! column is stored as NULL. Nothing is ever computed from a substituted
//! zero.

pub mod alerts;
pub mod indicators;

use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClimateReading, IrrigationReading, PlantReading};

pub use alerts::{Alert, AlertKind, AnomalySource, RandomAnomalySource, critical_condition};
pub use indicators::NutritionAdvice;

/// Indicators for one (zone, species) pair of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub zone: String,
    pub species: String,

    /// Plant stress, `[0, 1]`
    pub stress_index: Option<f64>,

    /// Effective fruit count, `>= 0` for non-negative inputs
    pub fruit_yield: Option<f64>,

    /// Photosynthetic efficiency, `[0, 1]`
    pub light_efficiency: Option<f64>,

    pub irrigation_needed: Option<bool>,
    pub nutrition_advice: Option<NutritionAdvice>,
    pub computed_at: DateTime<Utc>,
}

impl DerivedMetrics {
    /// Evaluate every indicator for one pair.
    ///
    /// `hour` is the local hour of day used for the day/night light window.
    pub fn evaluate(
        zone: &str,
        climate: &ClimateReading,
        species: &str,
        plant: &PlantReading,
        irrigation: Option<&IrrigationReading>,
        hour: u32,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let stress_index = match (
            climate.temperature,
            climate.humidity,
            climate.co2,
            plant.health_level,
        ) {
            (Some(temperature), Some(humidity), Some(co2), Some(health)) => Some(
                indicators::stress_index(temperature, humidity, co2, health),
            ),
            _ => None,
        };

        let fruit_yield = match (plant.fruit_count, plant.fruit_quality, plant.growth) {
            (Some(count), Some(quality), Some(growth)) => {
                Some(indicators::fruit_yield(count, quality, growth))
            }
            _ => None,
        };

        let light_efficiency = match (climate.light_intensity, plant.growth) {
            (Some(intensity), Some(growth)) => {
                Some(indicators::light_efficiency(intensity, hour, growth))
            }
            _ => None,
        };

        let irrigation_needed = irrigation.and_then(|irrigation| {
            match (
                irrigation.reservoir_level,
                climate.temperature,
                climate.humidity,
            ) {
                (Some(level), Some(temperature), Some(humidity)) => {
                    Some(indicators::irrigation_needed(
                        level,
                        irrigation.flow.unwrap_or_default(),
                        temperature,
                        humidity,
                    ))
                }
                _ => None,
            }
        });

        let nutrition_advice = irrigation.and_then(|irrigation| {
            match (plant.health_level, irrigation.ph, irrigation.conductivity) {
                (Some(health), Some(ph), Some(conductivity)) => {
                    Some(indicators::nutrition_advice(health, ph, conductivity))
                }
                _ => None,
            }
        });

        Self {
            zone: zone.to_string(),
            species: species.to_string(),
            stress_index,
            fruit_yield,
            light_efficiency,
            irrigation_needed,
            nutrition_advice,
            computed_at,
        }
    }

    /// Whether every indicator could be computed.
    pub fn is_complete(&self) -> bool {
        self.stress_index.is_some()
            && self.fruit_yield.is_some()
            && self.light_efficiency.is_some()
            && self.irrigation_needed.is_some()
            && self.nutrition_advice.is_some()
    }
}

/// Local hour of day for a UTC instant.
pub fn local_hour(at: DateTime<Utc>) -> u32 {
    at.with_timezone(&Local).hour()
}
