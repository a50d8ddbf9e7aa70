//! Coordinated shutdown
//!
//! - in-flight messages finish before the server stops
//! - the final report sees every drained record
//! - a failing reporter does not prevent shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use greenhouse_telemetry::report::{
    LatexReportGenerator, ReportError, ReportHandle, SnapshotReporter,
};
use greenhouse_telemetry::shutdown::ShutdownCoordinator;
use greenhouse_telemetry::storage::{MemoryBackend, StorageError};
use tokio::sync::oneshot;

use crate::helpers::*;

/// Records how many derived rows were stored when the report was requested
struct RecordingReporter {
    store: Arc<MemoryBackend>,
    calls: AtomicUsize,
    derived_at_call: AtomicUsize,
}

#[async_trait]
impl SnapshotReporter for RecordingReporter {
    async fn generate_snapshot_report(&self) -> Result<ReportHandle, ReportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.derived_at_call
            .store(self.store.counts().await.derived, Ordering::SeqCst);
        Ok(ReportHandle {
            path: "report.tex".into(),
            generated_at: Utc::now(),
        })
    }
}

struct FailingReporter;

#[async_trait]
impl SnapshotReporter for FailingReporter {
    async fn generate_snapshot_report(&self) -> Result<ReportHandle, ReportError> {
        Err(ReportError::Storage(StorageError::Unavailable(
            "database is gone".to_string(),
        )))
    }
}

#[tokio::test]
async fn test_report_runs_after_drain() {
    let store = Arc::new(MemoryBackend::new());
    let reporter = Arc::new(RecordingReporter {
        store: store.clone(),
        calls: AtomicUsize::new(0),
        derived_at_call: AtomicUsize::new(0),
    });

    let server = bind_server(store.clone()).await;
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let coordinator = ShutdownCoordinator::new(Some(reporter.clone()));
    let run = tokio::spawn(async move {
        coordinator
            .run_until(server, async {
                let _ = stopped.await;
            })
            .await
    });

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    send(&mut client, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;
    wait_until(|| async { store.counts().await.derived == 1 }).await;

    stop.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.connections, 1);
    assert_matches!(outcome.report, Some(ReportHandle { ref path, .. }) if path.ends_with("report.tex"));
    assert_eq!(reporter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(reporter.derived_at_call.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_reporter_still_shuts_down() {
    let store = Arc::new(MemoryBackend::new());
    let server = bind_server(store.clone()).await;

    let coordinator = ShutdownCoordinator::new(Some(Arc::new(FailingReporter)));
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.run_until(server, async {}),
    )
    .await
    .unwrap();

    assert_eq!(outcome.connections, 0);
    assert!(outcome.report.is_none());
}

#[tokio::test]
async fn test_no_reporter_configured() {
    let store = Arc::new(MemoryBackend::new());
    let server = bind_server(store).await;

    let outcome = ShutdownCoordinator::new(None)
        .run_until(server, async {})
        .await;

    assert!(outcome.report.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_message_completes_before_exit() {
    let store = Arc::new(GatedBackend::new());
    let server = bind_server(store.clone()).await;
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let run = tokio::spawn(async move {
        ShutdownCoordinator::new(None)
            .run_until(server, async {
                let _ = stopped.await;
            })
            .await
    });

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    send(&mut client, snapshot_json(&["Zona A"], &["Tomate"]).as_bytes()).await;
    store.entered.notified().await;

    stop.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.is_finished());

    store.release.notify_one();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.connections, 1);
    let counts = store.inner.counts().await;
    assert_eq!(counts.climate, 1);
    assert_eq!(counts.derived, 1);
}

#[tokio::test]
async fn test_latex_report_written_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryBackend::new());
    let reporter = Arc::new(LatexReportGenerator::new(
        store.clone(),
        dir.path(),
        chrono::Duration::hours(24),
    ));

    let server = bind_server(store.clone()).await;
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let run = tokio::spawn(async move {
        ShutdownCoordinator::new(Some(reporter))
            .run_until(server, async {
                let _ = stopped.await;
            })
            .await
    });

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    send(
        &mut client,
        snapshot_json(&["Zona A"], &["Tomate"]).as_bytes(),
    )
    .await;
    wait_until(|| async { store.counts().await.derived == 1 }).await;

    stop.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();

    let handle = outcome.report.expect("report should be generated");
    assert!(handle.path.starts_with(dir.path()));

    let tex = tokio::fs::read_to_string(&handle.path).await.unwrap();
    assert!(tex.contains("\\begin{document}"));
    assert!(tex.contains("Zona A"));
    assert!(tex.contains("Tomate"));
}
