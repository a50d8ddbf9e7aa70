//! Helper functions for integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenhouse_telemetry::config::AlertConfig;
use greenhouse_telemetry::engine::{Alert, DerivedMetrics};
use greenhouse_telemetry::server::{IngestionServer, ServerSettings};
use greenhouse_telemetry::shutdown::{self, ShutdownTrigger};
use greenhouse_telemetry::storage::{
    AlertRow, ClimateRow, HealthStatus, IrrigationRow, MemoryBackend, PlantRow, StorageBackend,
    StorageResult,
};
use greenhouse_telemetry::{ClimateReading, IrrigationReading, PlantReading};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Time given to the server to consume one write before the next one, so
/// consecutive messages are not coalesced into a single read.
pub const MESSAGE_GAP: Duration = Duration::from_millis(150);

/// Settings without random anomaly alerts
pub fn quiet_settings() -> ServerSettings {
    ServerSettings {
        alerts: AlertConfig {
            anomaly_probability: 0.0,
            seed: Some(0),
        },
        ..Default::default()
    }
}

pub async fn bind_server(store: Arc<dyn StorageBackend>) -> IngestionServer {
    IngestionServer::bind("127.0.0.1:0".parse().unwrap(), store, quiet_settings())
        .await
        .unwrap()
}

/// A server running in the background until [`TestServer::shutdown`]
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    trigger: ShutdownTrigger,
    handle: JoinHandle<(IngestionServer, usize)>,
}

impl TestServer {
    pub async fn start(store: Arc<dyn StorageBackend>) -> Self {
        let mut server = bind_server(store).await;
        let addr = server.local_addr().unwrap();
        let (trigger, signal) = shutdown::channel();

        let handle = tokio::spawn(async move {
            let accepted = server.serve(signal).await;
            (server, accepted)
        });

        Self {
            addr,
            trigger,
            handle,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Trigger shutdown and return the number of connections served.
    pub async fn shutdown(self) -> usize {
        self.trigger.trigger();
        let (server, accepted) = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not drain in time")
            .unwrap();
        server.close();
        accepted
    }
}

pub fn nominal_climate() -> serde_json::Value {
    json!({
        "Temperatura": 20.0,
        "Humedad": 65.0,
        "CO2": 450.0,
        "IntensidadLuz": 800.0,
        "Presion": 1012.0
    })
}

pub fn nominal_plant() -> serde_json::Value {
    json!({
        "Crecimiento": 15.0,
        "CantidadFrutos": 10,
        "CalidadFrutos": 90.0,
        "NivelSalud": 95.0
    })
}

pub fn nominal_irrigation() -> serde_json::Value {
    json!({
        "pH": 6.0,
        "Conductividad": 1.5,
        "Flujo": 2.0,
        "NivelDeposito": 40.0,
        "CaudalHistorico": 100.0
    })
}

/// Snapshot with nominal readings for every given zone and species
pub fn snapshot_json(zones: &[&str], species: &[&str]) -> String {
    let climate: serde_json::Map<String, serde_json::Value> = zones
        .iter()
        .map(|zone| (zone.to_string(), nominal_climate()))
        .collect();
    let plants: serde_json::Map<String, serde_json::Value> = species
        .iter()
        .map(|name| (name.to_string(), nominal_plant()))
        .collect();

    json!({
        "clima": climate,
        "riego": { "Riego": nominal_irrigation() },
        "plantas": plants,
        "timestamp": "2025-01-01T12:00:00Z"
    })
    .to_string()
}

pub async fn send(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Memory backend whose climate writes wait until released.
///
/// `entered` is notified when a climate write starts, which marks a message
/// as in flight.
pub struct GatedBackend {
    pub inner: MemoryBackend,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl StorageBackend for GatedBackend {
    async fn append_climate(
        &self,
        zone: &str,
        reading: &ClimateReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.append_climate(zone, reading, at).await
    }

    async fn append_irrigation(
        &self,
        system: &str,
        reading: &IrrigationReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.inner.append_irrigation(system, reading, at).await
    }

    async fn append_plant(
        &self,
        species: &str,
        reading: &PlantReading,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.inner.append_plant(species, reading, at).await
    }

    async fn append_derived_metrics(&self, metrics: &DerivedMetrics) -> StorageResult<()> {
        self.inner.append_derived_metrics(metrics).await
    }

    async fn append_alert(&self, alert: &Alert) -> StorageResult<()> {
        self.inner.append_alert(alert).await
    }

    async fn query_column_exists(&self, table: &str, column: &str) -> StorageResult<bool> {
        self.inner.query_column_exists(table, column).await
    }

    async fn query_climate_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<ClimateRow>> {
        self.inner.query_climate_since(since).await
    }

    async fn query_irrigation_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<IrrigationRow>> {
        self.inner.query_irrigation_since(since).await
    }

    async fn query_plants_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<PlantRow>> {
        self.inner.query_plants_since(since).await
    }

    async fn query_derived_since(
        &self,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DerivedMetrics>> {
        self.inner.query_derived_since(since).await
    }

    async fn query_alerts_since(&self, since: DateTime<Utc>) -> StorageResult<Vec<AlertRow>> {
        self.inner.query_alerts_since(since).await
    }

    async fn query_active_alerts(&self, limit: usize) -> StorageResult<Vec<AlertRow>> {
        self.inner.query_active_alerts(limit).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn get_stats(&self) -> StorageResult<String> {
        self.inner.get_stats().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}
