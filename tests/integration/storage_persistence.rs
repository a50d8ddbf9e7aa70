//! Persistence through the SQLite backend
//!
//! Data ingested over TCP must survive the server and the backend being
//! closed and reopened.

use std::sync::Arc;

use greenhouse_telemetry::config::StorageConfig;
use greenhouse_telemetry::engine::NutritionAdvice;
use greenhouse_telemetry::storage::{self, StorageBackend};
use greenhouse_telemetry::storage::sqlite::SqliteBackend;

use crate::helpers::*;

#[tokio::test]
async fn test_ingested_data_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("greenhouse.db");
    let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;

    {
        let store = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let server = TestServer::start(store.clone()).await;
        let mut client = server.connect().await;

        send(
            &mut client,
            snapshot_json(&["Zona A", "Zona B"], &["Tomate"]).as_bytes(),
        )
        .await;

        let polled = store.clone();
        wait_until(move || {
            let store = polled.clone();
            async move {
                store
                    .query_derived_since(epoch)
                    .await
                    .map(|rows| rows.len() == 2)
                    .unwrap_or(false)
            }
        })
        .await;

        server.shutdown().await;
        store.close().await.unwrap();
    }

    let store = storage::open(&StorageConfig::Sqlite {
        path: db_path.clone(),
    })
    .await
    .unwrap();

    assert_eq!(store.query_climate_since(epoch).await.unwrap().len(), 2);
    assert_eq!(store.query_irrigation_since(epoch).await.unwrap().len(), 1);
    assert_eq!(store.query_plants_since(epoch).await.unwrap().len(), 1);

    let derived = store.query_derived_since(epoch).await.unwrap();
    assert_eq!(derived.len(), 2);
    assert!(derived.iter().all(|m| m.nutrition_advice == Some(NutritionAdvice::Ok)));
    assert!(derived.iter().all(|m| m.is_complete()));

    assert!(store.health_check().await.unwrap().healthy);
    store.close().await.unwrap();
}
