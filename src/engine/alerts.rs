//! Critical-condition predicate
//!
//! Evaluated once per (zone, species) pair. The predicate checks the climate
//! and plant readings against fixed ranges and, as a last resort, rolls an
//! injected [`AnomalySource`] to model unexpected situations the sensors do
//! not capture.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{ClimateReading, PlantReading};

/// Acceptable air temperature (°C, inclusive)
pub const TEMPERATURE_RANGE: (f64, f64) = (20.0, 24.0);

/// Acceptable CO₂ concentration (ppm, inclusive)
pub const CO2_RANGE: (f64, f64) = (400.0, 500.0);

/// Plant health below this value is critical
pub const CRITICAL_HEALTH: f64 = 75.0;

/// Light intensity below this value is critical
pub const CRITICAL_LIGHT: f64 = 50.0;

/// Default probability of an unconditioned anomaly alert
pub const DEFAULT_ANOMALY_PROBABILITY: f64 = 0.05;

/// Reason an alert was raised, named after the first clause that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    TemperatureOutOfRange,
    Co2OutOfRange,
    LowHealth,
    LowLight,
    UnexpectedAnomaly,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::TemperatureOutOfRange => "TEMPERATURE_OUT_OF_RANGE",
            AlertKind::Co2OutOfRange => "CO2_OUT_OF_RANGE",
            AlertKind::LowHealth => "LOW_HEALTH",
            AlertKind::LowLight => "LOW_LIGHT",
            AlertKind::UnexpectedAnomaly => "UNEXPECTED_ANOMALY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TEMPERATURE_OUT_OF_RANGE" => Some(AlertKind::TemperatureOutOfRange),
            "CO2_OUT_OF_RANGE" => Some(AlertKind::Co2OutOfRange),
            "LOW_HEALTH" => Some(AlertKind::LowHealth),
            "LOW_LIGHT" => Some(AlertKind::LowLight),
            "UNEXPECTED_ANOMALY" => Some(AlertKind::UnexpectedAnomaly),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raised alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub zone: String,
    pub species: String,
    pub kind: AlertKind,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        zone: impl Into<String>,
        species: impl Into<String>,
        kind: AlertKind,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            zone: zone.into(),
            species: species.into(),
            kind,
            raised_at,
        }
    }
}

/// Source of unconditioned anomaly triggers.
///
/// Each connection owns its own source, so implementations need `Send` but
/// never `Sync`.
pub trait AnomalySource: Send {
    /// Whether an unexpected anomaly happens for this evaluation
    fn anomaly(&mut self) -> bool;
}

/// Seedable random anomaly source firing with a fixed probability.
#[derive(Debug, Clone)]
pub struct RandomAnomalySource {
    rng: StdRng,
    probability: f64,
}

impl RandomAnomalySource {
    /// Deterministic source for a given seed
    pub fn seeded(seed: u64, probability: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn from_entropy(probability: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl AnomalySource for RandomAnomalySource {
    fn anomaly(&mut self) -> bool {
        self.rng.gen_bool(self.probability)
    }
}

fn outside(value: Option<f64>, (low, high): (f64, f64)) -> bool {
    value.is_some_and(|v| v < low || v > high)
}

fn below(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v < threshold)
}

/// Evaluate the critical-condition predicate for one (zone, species) pair.
///
/// Clauses are checked in order and the first one that fires names the
/// alert. Clauses without data never fire. The anomaly source is only rolled
/// when no measured clause fired.
pub fn critical_condition(
    climate: &ClimateReading,
    plant: &PlantReading,
    anomalies: &mut dyn AnomalySource,
) -> Option<AlertKind> {
    if outside(climate.temperature, TEMPERATURE_RANGE) {
        return Some(AlertKind::TemperatureOutOfRange);
    }

    if outside(climate.co2, CO2_RANGE) {
        return Some(AlertKind::Co2OutOfRange);
    }

    if below(plant.health_level, CRITICAL_HEALTH) {
        return Some(AlertKind::LowHealth);
    }

    if below(climate.light_intensity, CRITICAL_LIGHT) {
        return Some(AlertKind::LowLight);
    }

    if anomalies.anomaly() {
        return Some(AlertKind::UnexpectedAnomaly);
    }

    None
}
