//! End-to-end ingestion over TCP: producer → server → storage

use std::sync::Arc;

use greenhouse_telemetry::engine::{AlertKind, NutritionAdvice};
use greenhouse_telemetry::storage::{MemoryBackend, StorageBackend};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_snapshot_is_persisted_raw_and_derived() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;

    let mut client = server.connect().await;
    send(
        &mut client,
        snapshot_json(&["Zona A", "Zona B"], &["Tomate", "Lechuga"]).as_bytes(),
    )
    .await;

    wait_until(|| async { store.counts().await.derived == 4 }).await;

    let counts = store.counts().await;
    assert_eq!(counts.climate, 2);
    assert_eq!(counts.irrigation, 1);
    assert_eq!(counts.plants, 2);
    assert_eq!(counts.alerts, 0);

    let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
    let derived = store.query_derived_since(epoch).await.unwrap();
    for metrics in &derived {
        assert_eq!(metrics.stress_index, Some(0.01));
        assert_eq!(metrics.nutrition_advice, Some(NutritionAdvice::Ok));
        assert_eq!(metrics.irrigation_needed, Some(false));
    }

    let climate = store.query_climate_since(epoch).await.unwrap();
    assert_eq!(climate[0].reading.pressure, Some(1012.0));

    drop(client);
    assert_eq!(server.shutdown().await, 1);
}

#[tokio::test]
async fn test_messages_on_one_connection_are_all_processed() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    for expected in 1..=3 {
        send(&mut client, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;
        wait_until(|| async { store.counts().await.derived == expected }).await;
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_snapshots_are_stored_twice() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    let payload = snapshot_json(&["Zona A"], &["Tomate"]);
    send(&mut client, payload.as_bytes()).await;
    wait_until(|| async { store.counts().await.derived == 1 }).await;
    send(&mut client, payload.as_bytes()).await;
    wait_until(|| async { store.counts().await.derived == 2 }).await;

    let counts = store.counts().await;
    assert_eq!(counts.climate, 2);
    assert_eq!(counts.plants, 2);
    assert_eq!(counts.irrigation, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_critical_condition_raises_alert() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    send(
        &mut client,
        br#"{
            "clima": {"Invernadero": {"Temperatura": 22, "CO2": 650, "IntensidadLuz": 500}},
            "plantas": {"Pimiento": {"NivelSalud": 40}}
        }"#,
    )
    .await;

    wait_until(|| async { store.counts().await.alerts == 1 }).await;

    let active = store.query_active_alerts(10).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert.zone, "Invernadero");
    assert_eq!(active[0].alert.species, "Pimiento");
    assert_eq!(active[0].alert.kind, AlertKind::Co2OutOfRange);

    server.shutdown().await;
}

#[tokio::test]
async fn test_absent_inputs_leave_indicators_unavailable() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    send(
        &mut client,
        br#"{
            "clima": {"Zona A": {"Temperatura": 22, "Humedad": 65}},
            "plantas": {"Tomate": {"NivelSalud": 95, "Crecimiento": 15}},
            "sensores_extra": [1, 2, 3]
        }"#,
    )
    .await;

    wait_until(|| async { store.counts().await.derived == 1 }).await;

    let derived = store
        .query_derived_since(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH)
        .await
        .unwrap();
    assert_eq!(derived[0].stress_index, None);
    assert_eq!(derived[0].fruit_yield, None);
    assert_eq!(derived[0].light_efficiency, None);
    assert_eq!(derived[0].irrigation_needed, None);
    assert_eq!(derived[0].nutrition_advice, None);

    server.shutdown().await;
}
