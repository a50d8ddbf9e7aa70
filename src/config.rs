use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tracing::trace;

use crate::engine::RandomAnomalySource;
use crate::engine::alerts::DEFAULT_ANOMALY_PROBABILITY;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./greenhouse.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// Upper bound of bytes read per message
    #[serde(default = "crate::util::get_default_read_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            read_buffer_size: crate::util::get_default_read_buffer_size(),
            storage: StorageConfig::default(),
            alerts: AlertConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ListenConfig {
    #[serde(default = "crate::util::get_addr")]
    pub host: IpAddr,
    #[serde(default = "crate::util::get_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: crate::util::get_addr(),
            port: crate::util::get_port(),
        }
    }
}

impl ListenConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AlertConfig {
    /// Probability of an unconditioned anomaly alert per evaluated pair
    #[serde(default = "default_anomaly_probability")]
    pub anomaly_probability: f64,

    /// Fixed seed for reproducible anomaly triggers
    pub seed: Option<u64>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            anomaly_probability: default_anomaly_probability(),
            seed: None,
        }
    }
}

impl AlertConfig {
    /// Anomaly source for one connection.
    ///
    /// With a configured seed every connection gets its own deterministic
    /// stream derived from the seed and the connection id.
    pub fn source_for(&self, connection_id: u64) -> RandomAnomalySource {
        match self.seed {
            Some(seed) => {
                RandomAnomalySource::seeded(seed.wrapping_add(connection_id), self.anomaly_probability)
            }
            None => RandomAnomalySource::from_entropy(self.anomaly_probability),
        }
    }
}

fn default_anomaly_probability() -> f64 {
    DEFAULT_ANOMALY_PROBABILITY
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    /// How far back the shutdown report looks
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_report_dir(),
            window_hours: default_window_hours(),
        }
    }
}

impl ReportConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.window_hours))
    }
}

fn default_true() -> bool {
    true
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_window_hours() -> u32 {
    24
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
