//! Agronomic indicators
//!
//! Pure functions over raw sensor values. Every function is total over
//! finite inputs; absent inputs are handled by the caller (see
//! [`DerivedMetrics::evaluate`](super::DerivedMetrics::evaluate)).

use serde::{Deserialize, Serialize};

/// Optimal air temperature (°C)
pub const OPTIMAL_TEMPERATURE: f64 = 20.0;

/// Optimal relative humidity (%)
pub const OPTIMAL_HUMIDITY: f64 = 65.0;

/// Optimal CO₂ concentration (ppm)
pub const OPTIMAL_CO2: f64 = 450.0;

/// Growth value that counts as "fully grown" when scaling yield and light use
pub const REFERENCE_GROWTH: f64 = 15.0;

/// Acceptable nutrient solution pH
pub const PH_RANGE: (f64, f64) = (5.8, 6.2);

/// Acceptable nutrient solution conductivity (mS/cm)
pub const CONDUCTIVITY_RANGE: (f64, f64) = (1.2, 1.8);

/// Health level below which a plant needs attention
pub const HEALTH_THRESHOLD: f64 = 75.0;

/// Hours (local, inclusive) during which daylight efficiency applies
pub const DAYLIGHT_HOURS: (u32, u32) = (8, 18);

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Plant stress between 0 (none) and 1 (maximum).
///
/// Average of four factors, each clamped to `[0, 1]`: heat above 20°C over
/// 4°C, humidity deviation from 65% over 20 points, CO₂ deviation from 450ppm
/// over 200ppm, and the missing share of plant health.
pub fn stress_index(temperature: f64, humidity: f64, co2: f64, health: f64) -> f64 {
    // only heat contributes, a cool greenhouse is not treated as stressed
    let temperature_factor = ((temperature - OPTIMAL_TEMPERATURE) / 4.0).clamp(0.0, 1.0);
    let humidity_factor = ((humidity - OPTIMAL_HUMIDITY).abs() / 20.0).clamp(0.0, 1.0);
    let co2_factor = ((co2 - OPTIMAL_CO2).abs() / 200.0).clamp(0.0, 1.0);
    let health_factor = (1.0 - health / 100.0).clamp(0.0, 1.0);

    round2((temperature_factor + humidity_factor + co2_factor + health_factor) / 4.0)
}

/// Effective fruit count.
///
/// Quality and growth outside their nominal ranges scale the result
/// proportionally, nothing is clamped.
pub fn fruit_yield(count: u32, quality: f64, growth: f64) -> f64 {
    round2(count as f64 * (quality / 100.0) * (growth / REFERENCE_GROWTH))
}

/// Photosynthetic light efficiency.
///
/// Daytime is capped at 1.0, night at 0.2 even with identical intensity.
pub fn light_efficiency(intensity: f64, hour: u32, growth: f64) -> f64 {
    let growth_factor = growth / REFERENCE_GROWTH;
    let efficiency = if (DAYLIGHT_HOURS.0..=DAYLIGHT_HOURS.1).contains(&hour) {
        (intensity / 1000.0 * growth_factor).min(1.0)
    } else {
        (intensity / 200.0 * growth_factor).min(0.2)
    };
    round2(efficiency)
}

/// Whether irrigation has to be increased.
///
/// `flow` is part of the signature but does not take part in the dryness
/// risk; the published formula only weighs reservoir level, humidity and heat.
pub fn irrigation_needed(reservoir_level: f64, _flow: f64, temperature: f64, humidity: f64) -> bool {
    let dryness_risk = (30.0 - reservoir_level) / 30.0
        + ((25.0 - humidity) / 25.0).max(0.0)
        + ((temperature - 22.0) / 5.0).max(0.0);
    dryness_risk > 1.0
}

/// Recommendation for the nutrient solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NutritionAdvice {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "AdjustPH")]
    AdjustPh,
    AdjustNutrients,
    ReviewHealth,
}

impl NutritionAdvice {
    pub fn as_str(&self) -> &'static str {
        match self {
            NutritionAdvice::Ok => "OK",
            NutritionAdvice::AdjustPh => "AdjustPH",
            NutritionAdvice::AdjustNutrients => "AdjustNutrients",
            NutritionAdvice::ReviewHealth => "ReviewHealth",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(NutritionAdvice::Ok),
            "AdjustPH" => Some(NutritionAdvice::AdjustPh),
            "AdjustNutrients" => Some(NutritionAdvice::AdjustNutrients),
            "ReviewHealth" => Some(NutritionAdvice::ReviewHealth),
            _ => None,
        }
    }
}

impl std::fmt::Display for NutritionAdvice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First matching rule wins: pH, then conductivity, then plant health.
pub fn nutrition_advice(health: f64, ph: f64, conductivity: f64) -> NutritionAdvice {
    if ph < PH_RANGE.0 || ph > PH_RANGE.1 {
        NutritionAdvice::AdjustPh
    } else if conductivity < CONDUCTIVITY_RANGE.0 || conductivity > CONDUCTIVITY_RANGE.1 {
        NutritionAdvice::AdjustNutrients
    } else if health < HEALTH_THRESHOLD {
        NutritionAdvice::ReviewHealth
    } else {
        NutritionAdvice::Ok
    }
}
