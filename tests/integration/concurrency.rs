//! Concurrency tests
//!
//! - many producers at once, each record attributed to its own snapshot
//! - one stalled connection does not hold up the others

use std::sync::Arc;

use greenhouse_telemetry::storage::{MemoryBackend, StorageBackend};

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let store = Arc::new(MemoryBackend::new());
    let server = TestServer::start(store.clone()).await;

    let mut tasks = vec![];
    for i in 0..10 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
            let zone = format!("Zona {i}");
            send(&mut client, snapshot_json(&[&zone], &["Tomate"]).as_bytes()).await;
            client
        }));
    }

    let mut clients = vec![];
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    wait_until(|| async { store.counts().await.derived == 10 }).await;

    let mut zones: Vec<String> = store
        .query_derived_since(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH)
        .await
        .unwrap()
        .into_iter()
        .map(|metrics| metrics.zone)
        .collect();
    zones.sort();
    zones.dedup();
    assert_eq!(zones.len(), 10);

    assert_eq!(server.shutdown().await, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_connection_does_not_block_others() {
    let store = Arc::new(GatedBackend::new());
    let server = TestServer::start(store.clone()).await;

    let mut stalled = server.connect().await;
    send(&mut stalled, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;
    store.entered.notified().await;

    // plant-only snapshots never touch the gated climate table
    let mut other = server.connect().await;
    send(&mut other, br#"{"plantas": {"Lechuga": {"NivelSalud": 90}}}"#).await;
    wait_until(|| async { store.inner.counts().await.plants == 2 }).await;
    assert_eq!(store.inner.counts().await.climate, 0);

    store.release.notify_one();
    wait_until(|| async { store.inner.counts().await.derived == 1 }).await;

    server.shutdown().await;
}
