//! Telemetry codec
//!
//! Decodes one inbound JSON message into a [`TelemetrySnapshot`]. The decode
//! step is schema tolerant:
//!
//! - unknown top-level keys and unknown reading fields are dropped
//! - missing numeric fields stay `None` ("absent"), they are never zero
//! - a numeric field carrying a non-numeric value is treated as absent
//!
//! Only payloads that are not a JSON object at all, or whose known sections
//! have the wrong shape, are rejected as malformed.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::{ClimateReading, IrrigationReading, PlantReading};

/// Irrigation system the derived metrics are computed against when present.
pub const PRIMARY_IRRIGATION_SYSTEM: &str = "Riego";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("snapshot contains no climate, irrigation or plant readings")]
    EmptySnapshot,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub climate: BTreeMap<String, ClimateReading>,
    pub irrigation: BTreeMap<String, IrrigationReading>,
    pub plants: BTreeMap<String, PlantReading>,

    /// Producer supplied timestamp, if one was sent and could be understood
    pub captured_at: Option<DateTime<Utc>>,

    /// Server clock when the message was decoded
    pub received_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    pub fn is_empty(&self) -> bool {
        self.climate.is_empty() && self.irrigation.is_empty() && self.plants.is_empty()
    }

    /// Number of (zone, species) pairs this snapshot evaluates.
    pub fn pair_count(&self) -> usize {
        self.climate.len() * self.plants.len()
    }

    /// How far the server clock is ahead of the producer's timestamp.
    ///
    /// Negative when the producer clock runs ahead. `None` without a usable
    /// producer timestamp.
    pub fn clock_skew(&self) -> Option<chrono::Duration> {
        self.captured_at
            .map(|captured_at| self.received_at - captured_at)
    }

    /// The irrigation reading every (zone, species) pair is correlated with.
    ///
    /// Prefers the system named [`PRIMARY_IRRIGATION_SYSTEM`] and falls back
    /// to the first system by name.
    pub fn primary_irrigation(&self) -> Option<(&str, &IrrigationReading)> {
        self.irrigation
            .get_key_value(PRIMARY_IRRIGATION_SYSTEM)
            .or_else(|| self.irrigation.iter().next())
            .map(|(name, reading)| (name.as_str(), reading))
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(rename = "clima", default)]
    climate: Option<BTreeMap<String, ClimateReading>>,
    #[serde(rename = "riego", default)]
    irrigation: Option<BTreeMap<String, IrrigationReading>>,
    #[serde(rename = "plantas", default)]
    plants: Option<BTreeMap<String, PlantReading>>,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// Decode a message received now.
pub fn parse(bytes: &[u8]) -> Result<TelemetrySnapshot, CodecError> {
    parse_at(bytes, Utc::now())
}

/// Decode a message, stamping it with the given receive time.
pub fn parse_at(bytes: &[u8], received_at: DateTime<Utc>) -> Result<TelemetrySnapshot, CodecError> {
    // go through a map first, so top-level arrays are rejected instead of
    // being matched positionally against the payload fields
    let object: serde_json::Map<String, Value> = serde_json::from_slice(bytes)?;
    let payload: WirePayload = serde_json::from_value(Value::Object(object))?;

    let snapshot = TelemetrySnapshot {
        climate: payload.climate.unwrap_or_default(),
        irrigation: payload.irrigation.unwrap_or_default(),
        plants: payload.plants.unwrap_or_default(),
        captured_at: payload.timestamp.as_ref().and_then(parse_timestamp),
        received_at,
    };

    if snapshot.is_empty() {
        return Err(CodecError::EmptySnapshot);
    }

    trace!(
        zones = snapshot.climate.len(),
        systems = snapshot.irrigation.len(),
        species = snapshot.plants.len(),
        "decoded snapshot"
    );

    Ok(snapshot)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(number) => match number.as_i64() {
            Some(secs) => DateTime::from_timestamp(secs, 0),
            None => number
                .as_f64()
                .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0) as i64)),
        },
        _ => None,
    }
}

/// Field deserializers that turn unusable values into "absent".
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|v| v.as_f64()))
    }

    pub fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|v| match v.as_u64() {
            Some(count) => u32::try_from(count).ok(),
            None => v
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64)
                .map(|f| f as u32),
        }))
    }
}
