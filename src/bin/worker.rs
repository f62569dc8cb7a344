use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coderev_platform::config::AppConfig;
use coderev_platform::workers::{MainWorker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = AppConfig::from_env()?;
    let worker_config = WorkerConfig::from_env()?;

    let mut worker = MainWorker::new(app_config, worker_config);
    worker.start().await?;

    info!("Worker system running, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;

    worker.signal_shutdown();
    worker.await_shutdown().await?;
    Ok(())
}
