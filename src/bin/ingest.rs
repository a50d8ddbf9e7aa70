use std::sync::Arc;

use clap::Parser;
use greenhouse_telemetry::{
    config::{Config, read_config_file},
    report::{LatexReportGenerator, SnapshotReporter},
    server::{IngestionServer, ServerSettings},
    shutdown::{ShutdownCoordinator, termination_signal},
    storage,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("greenhouse_telemetry", LevelFilter::DEBUG),
        ("greenhouse_ingest", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let store = storage::open(&config.storage).await?;
    storage::log_stats(store.as_ref()).await;

    let server = IngestionServer::bind(
        config.listen.socket_addr(),
        store.clone(),
        ServerSettings::from(&config),
    )
    .await?;

    let reporter: Option<Arc<dyn SnapshotReporter>> = config.report.enabled.then(|| {
        Arc::new(LatexReportGenerator::from_config(store.clone(), &config.report))
            as Arc<dyn SnapshotReporter>
    });

    let outcome = ShutdownCoordinator::new(reporter)
        .run_until(server, termination_signal())
        .await;
    info!("served {} connections", outcome.connections);

    if let Err(e) = store.close().await {
        error!("failed to close storage: {e}");
    }

    Ok(())
}
