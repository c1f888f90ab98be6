use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kiwi_ai::ProviderMetrics;
use kiwi_broker::{Broker, LapinBroker};
use kiwi_core::config::KiwiConfig;
use kiwi_loader::{BlobStore, FileLoader, LocalBlobStore};
use kiwi_store::GraphStore;
use kiwi_worker::{WorkerEngine, WorkerMode};

/// Runs one or more of the three durable queues (§4.6.1): `full` drains all
/// three, `preprocess`/`graph` split the pipeline across dedicated processes.
#[derive(Debug, Parser)]
#[command(name = "kiwi-worker")]
struct Cli {
    #[arg(long, value_enum, default_value = "full")]
    mode: WorkerMode,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    database_url: Option<String>,

    #[arg(long)]
    amqp_url: Option<String>,
}

impl clap::ValueEnum for WorkerMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[WorkerMode::Full, WorkerMode::Preprocess, WorkerMode::Graph]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            WorkerMode::Full => clap::builder::PossibleValue::new("full"),
            WorkerMode::Preprocess => clap::builder::PossibleValue::new("preprocess"),
            WorkerMode::Graph => clap::builder::PossibleValue::new("graph"),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kiwi_worker=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| std::env::var("KIWI_CONFIG").ok());
    let mut config = KiwiConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        KiwiConfig::default()
    });
    if let Some(url) = cli.database_url.clone() {
        config.database.url = url;
    }
    if let Some(url) = cli.amqp_url.clone() {
        config.broker.amqp_url = url;
    }

    let store = Arc::new(GraphStore::connect(&config.database.url).await?);
    store.init_schema().await?;

    let metrics = Arc::new(ProviderMetrics::default());
    let ai = Arc::new(kiwi_ai::build_client(&config.ai, config.ai.timeout_worker_min, metrics));
    let loader = Arc::new(FileLoader::new(ai.clone(), config.loader.clone()));
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(config.blob.root.clone()));
    let broker: Arc<dyn Broker> = Arc::new(LapinBroker::connect(&config.broker.amqp_url).await?);

    let engine = Arc::new(WorkerEngine::new(store, ai, loader, config.loader.clone(), blobs, broker, config.worker.clone()));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, draining in-flight deliveries");
        shutdown.cancel();
    });

    info!(mode = ?cli.mode, "kiwi-worker starting");
    engine.run(cli.mode, cancel).await?;
    Ok(())
}
