pub mod codec;
pub mod config;
pub mod engine;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod util;

use serde::{Deserialize, Serialize};

use crate::codec::lenient;

/// Pressure (hPa) recorded for a climate reading that does not report one.
pub const STANDARD_PRESSURE_HPA: f64 = 1013.0;

fn standard_pressure() -> Option<f64> {
    Some(STANDARD_PRESSURE_HPA)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateReading {
    #[serde(rename = "Temperatura", default, deserialize_with = "lenient::number")]
    pub temperature: Option<f64>,
    #[serde(rename = "Humedad", default, deserialize_with = "lenient::number")]
    pub humidity: Option<f64>,
    #[serde(rename = "CO2", default, deserialize_with = "lenient::number")]
    pub co2: Option<f64>,
    #[serde(rename = "IntensidadLuz", default, deserialize_with = "lenient::number")]
    pub light_intensity: Option<f64>,
    #[serde(
        rename = "Presion",
        default = "standard_pressure",
        deserialize_with = "lenient::number"
    )]
    pub pressure: Option<f64>,
}

impl Default for ClimateReading {
    fn default() -> Self {
        Self {
            temperature: None,
            humidity: None,
            co2: None,
            light_intensity: None,
            pressure: standard_pressure(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrrigationReading {
    #[serde(rename = "pH", default, deserialize_with = "lenient::number")]
    pub ph: Option<f64>,
    #[serde(rename = "Conductividad", default, deserialize_with = "lenient::number")]
    pub conductivity: Option<f64>,
    #[serde(rename = "Flujo", default, deserialize_with = "lenient::number")]
    pub flow: Option<f64>,
    #[serde(rename = "NivelDeposito", default, deserialize_with = "lenient::number")]
    pub reservoir_level: Option<f64>,
    #[serde(rename = "CaudalHistorico", default, deserialize_with = "lenient::number")]
    pub historical_flow: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantReading {
    #[serde(rename = "Crecimiento", default, deserialize_with = "lenient::number")]
    pub growth: Option<f64>,
    #[serde(rename = "CantidadFrutos", default, deserialize_with = "lenient::count")]
    pub fruit_count: Option<u32>,
    #[serde(rename = "CalidadFrutos", default, deserialize_with = "lenient::number")]
    pub fruit_quality: Option<f64>,
    #[serde(rename = "NivelSalud", default, deserialize_with = "lenient::number")]
    pub health_level: Option<f64>,
}
