//! Failure scenarios
//!
//! - malformed messages are skipped, the connection stays open
//! - an unavailable table only loses its own records
//! - a producer disconnecting does not affect the server

use std::sync::Arc;

use greenhouse_telemetry::storage::MemoryBackend;
use greenhouse_telemetry::storage::schema::IRRIGATION_TABLE;

use crate::helpers::*;

#[tokio::test]
async fn test_malformed_message_then_valid_snapshot() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    send(&mut client, b"{bad json").await;
    tokio::time::sleep(MESSAGE_GAP).await;
    send(&mut client, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;

    wait_until(|| async { store.counts().await.derived == 1 }).await;
    assert_eq!(store.counts().await.climate, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_empty_and_non_object_messages_are_skipped() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    for payload in [&b"{}"[..], b"[1, 2, 3]", b"{\"clima\": 5}"] {
        send(&mut client, payload).await;
        tokio::time::sleep(MESSAGE_GAP).await;
    }
    send(&mut client, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;

    wait_until(|| async { store.counts().await.derived == 1 }).await;
    assert_eq!(store.counts().await.raw(), 3);

    server.shutdown().await;
}

#[tokio::test]
async fn test_irrigation_outage_keeps_climate_and_plants() {
    let store = Arc::new(MemoryBackend::new());
    store.set_unavailable(IRRIGATION_TABLE, true).await;

    let server = TestServer::start(store.clone()).await;
    let mut client = server.connect().await;

    send(
        &mut client,
        snapshot_json(&["Zona A", "Zona B"], &["Tomate"]).as_bytes(),
    )
    .await;

    wait_until(|| async { store.counts().await.derived == 2 }).await;

    let counts = store.counts().await;
    assert_eq!(counts.climate, 2);
    assert_eq!(counts.plants, 1);
    assert_eq!(counts.irrigation, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_does_not_affect_other_producers() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;

    let early = server.connect().await;
    drop(early);

    let mut client = server.connect().await;
    send(&mut client, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;
    wait_until(|| async { store.counts().await.derived == 1 }).await;

    assert_eq!(server.shutdown().await, 2);
}
