//! Snapshot reports
//!
//! The shutdown coordinator (and external consumers such as a dashboard) ask
//! a [`SnapshotReporter`] for a report of the most recent data. Report
//! failures are never fatal to the caller.
//!
//! [`LatexReportGenerator`] renders the last window of stored data into a
//! standalone LaTeX document:
//!
//! - average/min/max per raw reading field (climate, irrigation, plants)
//! - average of every numeric derived indicator per (zone, species)
//! - alert counts grouped by (zone, species, kind)

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::ReportConfig;
use crate::engine::DerivedMetrics;
use crate::storage::{AlertRow, StorageBackend, StorageError};
use crate::{ClimateReading, IrrigationReading, PlantReading};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report data: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("report window of {hours} hours reaches before the earliest representable time")]
    WindowOutOfRange { hours: i64 },
}

/// Location of a generated report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportHandle {
    pub path: PathBuf,
    pub generated_at: DateTime<Utc>,
}

/// Reporting collaborator
#[async_trait]
pub trait SnapshotReporter: Send + Sync {
    async fn generate_snapshot_report(&self) -> Result<ReportHandle, ReportError>;
}

/// Mean, minimum and maximum of one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl FieldStats {
    /// `None` when there are no values.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut stats: Option<FieldStats> = None;
        let mut sum = 0.0;

        for value in values {
            sum += value;
            stats = Some(match stats {
                None => FieldStats {
                    mean: value,
                    min: value,
                    max: value,
                    samples: 1,
                },
                Some(current) => FieldStats {
                    mean: 0.0,
                    min: current.min.min(value),
                    max: current.max.max(value),
                    samples: current.samples + 1,
                },
            });
        }

        stats.map(|stats| FieldStats {
            mean: sum / stats.samples as f64,
            ..stats
        })
    }
}

type Field<R> = (&'static str, fn(&R) -> Option<f64>);

fn climate_fields() -> [Field<ClimateReading>; 5] {
    [
        ("Temperature (°C)", |r: &ClimateReading| r.temperature),
        ("Humidity (\\%)", |r: &ClimateReading| r.humidity),
        ("CO$_2$ (ppm)", |r: &ClimateReading| r.co2),
        ("Light intensity", |r: &ClimateReading| r.light_intensity),
        ("Pressure (hPa)", |r: &ClimateReading| r.pressure),
    ]
}

fn irrigation_fields() -> [Field<IrrigationReading>; 5] {
    [
        ("pH", |r: &IrrigationReading| r.ph),
        ("Conductivity (mS/cm)", |r: &IrrigationReading| r.conductivity),
        ("Flow (L/min)", |r: &IrrigationReading| r.flow),
        ("Reservoir level (\\%)", |r: &IrrigationReading| r.reservoir_level),
        ("Historical flow", |r: &IrrigationReading| r.historical_flow),
    ]
}

fn plant_fields() -> [Field<PlantReading>; 4] {
    [
        ("Growth", |r: &PlantReading| r.growth),
        ("Fruit count", |r: &PlantReading| r.fruit_count.map(f64::from)),
        ("Fruit quality", |r: &PlantReading| r.fruit_quality),
        ("Health level", |r: &PlantReading| r.health_level),
    ]
}

/// Escape LaTeX special characters in free text (zone and species names).
pub fn escape_tex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            '\\' => escaped.push_str(r"\textbackslash{}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render a stats table, or `None` when no field has a value.
fn stats_table<R>(title: &str, records: &[&R], fields: &[Field<R>]) -> Option<String> {
    let rows: Vec<String> = fields
        .iter()
        .filter_map(|(label, value)| {
            FieldStats::from_values(records.iter().filter_map(|record| value(*record))).map(
                |stats| {
                    format!(
                        "{} & {:.2} & {:.2} & {:.2} \\\\",
                        label, stats.mean, stats.min, stats.max
                    )
                },
            )
        })
        .collect();

    if rows.is_empty() {
        return None;
    }

    Some(table(
        title,
        "l c c c",
        "Metric & Mean & Min & Max \\\\",
        &rows,
    ))
}

fn table(caption: &str, columns: &str, header: &str, rows: &[String]) -> String {
    let mut out = String::new();
    out.push_str("\\begin{table}[h!]\n\\centering\n");
    let _ = writeln!(out, "\\caption{{{}}}", escape_tex(caption));
    let _ = writeln!(out, "\\begin{{tabular}}{{{columns}}}");
    out.push_str("\\toprule\n");
    let _ = writeln!(out, "{header}");
    out.push_str("\\midrule\n");
    for row in rows {
        let _ = writeln!(out, "{row}");
    }
    out.push_str("\\bottomrule\n\\end{tabular}\n\\end{table}\n");
    out
}

fn derived_table(derived: &[DerivedMetrics]) -> Option<String> {
    if derived.is_empty() {
        return None;
    }

    let mut pairs: BTreeMap<(&str, &str), Vec<&DerivedMetrics>> = BTreeMap::new();
    for metrics in derived {
        pairs
            .entry((metrics.zone.as_str(), metrics.species.as_str()))
            .or_default()
            .push(metrics);
    }

    let format_mean = |stats: Option<FieldStats>| {
        stats.map_or_else(|| "-".to_string(), |stats| format!("{:.2}", stats.mean))
    };

    let rows: Vec<String> = pairs
        .into_iter()
        .map(|((zone, species), records)| {
            let stress = FieldStats::from_values(records.iter().filter_map(|m| m.stress_index));
            let fruit = FieldStats::from_values(records.iter().filter_map(|m| m.fruit_yield));
            let light =
                FieldStats::from_values(records.iter().filter_map(|m| m.light_efficiency));
            let irrigation = records
                .iter()
                .filter(|m| m.irrigation_needed == Some(true))
                .count();

            format!(
                "{} & {} & {} & {} & {} & {} \\\\",
                escape_tex(zone),
                escape_tex(species),
                format_mean(stress),
                format_mean(fruit),
                format_mean(light),
                irrigation
            )
        })
        .collect();

    Some(table(
        "Derived indicators",
        "l l c c c c",
        "Zone & Species & Stress & Yield & Light eff. & Irrigation needed \\\\",
        &rows,
    ))
}

fn alert_table(alerts: &[AlertRow]) -> Option<String> {
    if alerts.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<(&str, &str, &str), usize> = BTreeMap::new();
    for row in alerts {
        *counts
            .entry((
                row.alert.zone.as_str(),
                row.alert.species.as_str(),
                row.alert.kind.as_str(),
            ))
            .or_default() += 1;
    }

    let rows: Vec<String> = counts
        .into_iter()
        .map(|((zone, species, kind), count)| {
            format!(
                "{} & {} & {} & {} \\\\",
                escape_tex(zone),
                escape_tex(species),
                escape_tex(kind),
                count
            )
        })
        .collect();

    Some(table(
        "Critical alerts",
        "l l l c",
        "Zone & Species & Alert & Events \\\\",
        &rows,
    ))
}

/// Writes `report_<YYYYmmdd_HHMMSS>.tex` files from the stored data
pub struct LatexReportGenerator {
    store: Arc<dyn StorageBackend>,
    output_dir: PathBuf,
    window: Duration,
}

impl LatexReportGenerator {
    pub fn new(store: Arc<dyn StorageBackend>, output_dir: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            window,
        }
    }

    pub fn from_config(store: Arc<dyn StorageBackend>, config: &ReportConfig) -> Self {
        Self::new(store, config.output_dir.clone(), config.window())
    }

    /// Render the report document for the window ending at `now`.
    #[instrument(skip(self))]
    pub async fn render(&self, now: DateTime<Utc>) -> Result<String, ReportError> {
        let since = now
            .checked_sub_signed(self.window)
            .ok_or(ReportError::WindowOutOfRange {
                hours: self.window.num_hours(),
            })?;

        let climate = self.store.query_climate_since(since).await?;
        let irrigation = self.store.query_irrigation_since(since).await?;
        let plants = self.store.query_plants_since(since).await?;
        let derived = self.store.query_derived_since(since).await?;
        let alerts = self.store.query_alerts_since(since).await?;

        debug!(
            "report window contains {} climate, {} irrigation, {} plant, {} derived and {} alert rows",
            climate.len(),
            irrigation.len(),
            plants.len(),
            derived.len(),
            alerts.len()
        );

        let hours = self.window.num_hours();
        let mut document = String::new();
        document.push_str(
            "\\documentclass{article}\n\\usepackage[utf8]{inputenc}\n\\usepackage{booktabs}\n",
        );
        document.push_str("\\title{Greenhouse snapshot report}\n");
        let _ = writeln!(document, "\\date{{{}}}", now.format("%Y-%m-%d %H:%M:%S UTC"));
        document.push_str("\\begin{document}\n\\maketitle\n\n");

        document.push_str("\\section{Sensor readings}\n");
        let climate: Vec<&ClimateReading> = climate.iter().map(|row| &row.reading).collect();
        let irrigation: Vec<&IrrigationReading> =
            irrigation.iter().map(|row| &row.reading).collect();
        let plants: Vec<&PlantReading> = plants.iter().map(|row| &row.reading).collect();

        let sections: Vec<String> = [
            stats_table("Climate summary", &climate, &climate_fields()),
            stats_table("Irrigation summary", &irrigation, &irrigation_fields()),
            stats_table("Plant summary", &plants, &plant_fields()),
        ]
        .into_iter()
        .flatten()
        .collect();

        if sections.is_empty() {
            let _ = writeln!(document, "No data recorded in the last {hours} hours.\n");
        } else {
            document.push_str(&sections.join("\n"));
            document.push('\n');
        }

        document.push_str("\\section{Derived indicators}\n");
        match derived_table(&derived) {
            Some(table) => document.push_str(&table),
            None => {
                let _ = writeln!(document, "No indicators computed in the last {hours} hours.");
            }
        }
        document.push('\n');

        document.push_str("\\section{Critical alerts}\n");
        match alert_table(&alerts) {
            Some(table) => document.push_str(&table),
            None => {
                let _ = writeln!(document, "No critical alerts in the last {hours} hours.");
            }
        }

        document.push_str("\n\\end{document}\n");
        Ok(document)
    }
}

#[async_trait]
impl SnapshotReporter for LatexReportGenerator {
    #[instrument(skip(self), fields(output_dir = %self.output_dir.display()))]
    async fn generate_snapshot_report(&self) -> Result<ReportHandle, ReportError> {
        let generated_at = Utc::now();
        let document = self.render(generated_at).await?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!(
            "report_{}.tex",
            generated_at.format("%Y%m%d_%H%M%S")
        ));
        tokio::fs::write(&path, document).await?;

        info!("wrote snapshot report to {}", path.display());

        Ok(ReportHandle { path, generated_at })
    }
}
