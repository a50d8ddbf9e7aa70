//! Processing of one decoded snapshot
//!
//! 1. raw readings are written concurrently, each write independent
//! 2. every (zone, species) pair of the snapshot is evaluated into
//!    [`DerivedMetrics`] and persisted
//! 3. the critical-condition predicate runs per pair and raises at most one
//!    alert for it
//!
//! Storage failures are logged and counted per record; they never abort the
//! rest of the snapshot.

use futures::future::join_all;
use tracing::{debug, error, instrument, warn};

use crate::codec::TelemetrySnapshot;
use crate::engine::{Alert, AnomalySource, DerivedMetrics, critical_condition, local_hour};
use crate::storage::{StorageBackend, StorageError};
use crate::storage::schema::{CLIMATE_TABLE, IRRIGATION_TABLE, PLANT_TABLE};

/// Write counts for one processed snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingReport {
    pub raw_written: usize,
    pub raw_failed: usize,
    pub derived_written: usize,
    pub derived_failed: usize,
    pub alerts_raised: usize,
    pub alerts_failed: usize,
}

impl ProcessingReport {
    pub fn failures(&self) -> usize {
        self.raw_failed + self.derived_failed + self.alerts_failed
    }
}

/// Outages are expected and only warned about, anything else is an error.
fn log_skipped(record: &str, e: &StorageError) {
    if e.is_unavailable() {
        warn!("storage unavailable, skipped {record}: {e}");
    } else {
        error!("failed to persist {record}: {e}");
    }
}

#[instrument(skip_all, fields(zones = snapshot.climate.len(), species = snapshot.plants.len()))]
pub async fn process_snapshot(
    store: &dyn StorageBackend,
    snapshot: &TelemetrySnapshot,
    anomalies: &mut dyn AnomalySource,
) -> ProcessingReport {
    let at = snapshot.received_at;
    let mut report = ProcessingReport::default();

    match snapshot.clock_skew() {
        Some(skew) => debug!(
            "snapshot captured at {:?}, received at {at} ({}ms later)",
            snapshot.captured_at,
            skew.num_milliseconds()
        ),
        None => debug!("snapshot without producer timestamp, received at {at}"),
    }

    let (climate, irrigation, plants) = tokio::join!(
        join_all(
            snapshot
                .climate
                .iter()
                .map(|(zone, reading)| store.append_climate(zone, reading, at))
        ),
        join_all(
            snapshot
                .irrigation
                .iter()
                .map(|(system, reading)| store.append_irrigation(system, reading, at))
        ),
        join_all(
            snapshot
                .plants
                .iter()
                .map(|(species, reading)| store.append_plant(species, reading, at))
        ),
    );

    for (table, results) in [
        (CLIMATE_TABLE, climate),
        (IRRIGATION_TABLE, irrigation),
        (PLANT_TABLE, plants),
    ] {
        for result in results {
            match result {
                Ok(()) => report.raw_written += 1,
                Err(e) => {
                    report.raw_failed += 1;
                    log_skipped(&format!("reading into {table}"), &e);
                }
            }
        }
    }

    let irrigation = snapshot.primary_irrigation().map(|(_, reading)| reading);
    let hour = local_hour(at);

    for (zone, climate) in &snapshot.climate {
        for (species, plant) in &snapshot.plants {
            let metrics =
                DerivedMetrics::evaluate(zone, climate, species, plant, irrigation, hour, at);

            match store.append_derived_metrics(&metrics).await {
                Ok(()) => report.derived_written += 1,
                Err(e) => {
                    report.derived_failed += 1;
                    log_skipped(&format!("derived metrics for {zone}/{species}"), &e);
                }
            }

            let Some(kind) = critical_condition(climate, plant, anomalies) else {
                continue;
            };

            warn!("critical condition {kind} in {zone}/{species}");

            match store.append_alert(&Alert::new(zone, species, kind, at)).await {
                Ok(()) => report.alerts_raised += 1,
                Err(e) => {
                    report.alerts_failed += 1;
                    log_skipped(&format!("alert for {zone}/{species}"), &e);
                }
            }
        }
    }

    debug!("processed snapshot: {report:?}");
    report
}
