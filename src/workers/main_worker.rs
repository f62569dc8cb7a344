use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::future::join_all;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

use crate::analyzer::Analyzer;
use crate::cache::ResultCache;
use crate::config::AppConfig;
use crate::dlq::dlq_repository::DlqRepository;
use crate::reviews::job_repository::JobRepository;
use crate::workers::{
    DlqWorker, RedisQueue, ReviewWorker, WorkerConfig, WorkerError, WorkerMetrics, WorkerResult,
};

/// MainWorker coordinates the review worker pool and the DLQ handler pool
pub struct MainWorker {
    app_config: AppConfig,
    config: WorkerConfig,
    shutdown_signal: Arc<AtomicBool>,
    metrics: Arc<WorkerMetrics>,
    handles: Vec<JoinHandle<()>>,
}

impl MainWorker {
    pub fn new(app_config: AppConfig, config: WorkerConfig) -> Self {
        Self {
            app_config,
            config,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(WorkerMetrics::new()),
            handles: Vec::new(),
        }
    }

    /// Connect shared resources and start the enabled worker pools.
    pub async fn start(&mut self) -> WorkerResult<()> {
        info!("Starting Review Worker System");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&self.app_config.database_url)
            .await?;

        let client = redis::Client::open(&self.config.redis_url[..])?;
        let connection_manager = ConnectionManager::new(client).await?;

        let queue = RedisQueue::from_connection(connection_manager.clone(), &self.config);
        let jobs = JobRepository::new(pool.clone());
        let dlq = DlqRepository::new(pool);
        let cache = ResultCache::new(
            connection_manager.clone(),
            self.app_config.cache_ttl_seconds,
            self.app_config.cache_key_prefix.clone(),
        );
        let analyzer = Arc::new(Analyzer::new(self.app_config.analyzer_config()));

        // Metrics reporting background task
        let metrics_clone = self.metrics.clone();
        let shutdown = self.shutdown_signal.clone();
        tokio::spawn(async move {
            while !shutdown.load(Ordering::Relaxed) {
                tokio::time::sleep(std::time::Duration::from_secs(300)).await;
                metrics_clone.log_metrics();
            }
        });

        if self.config.review_worker_thread_enabled {
            info!(
                "Initializing review worker pool with {} threads",
                self.config.review_worker_thread_count
            );

            let review_worker = ReviewWorker::new(
                self.config.clone(),
                queue.clone(),
                jobs.clone(),
                cache,
                dlq.clone(),
                analyzer,
                connection_manager.clone(),
                self.shutdown_signal.clone(),
                self.metrics.clone(),
            );
            self.handles.extend(review_worker.start().await?);

            info!("Review worker pool started successfully");
        } else {
            info!("Review worker pool is disabled");
        }

        if self.config.dlq_worker_thread_enabled {
            info!(
                "Initializing DLQ worker pool with {} threads",
                self.config.dlq_worker_thread_count
            );

            let dlq_worker = DlqWorker::new(
                self.config.clone(),
                queue,
                jobs,
                dlq,
                self.shutdown_signal.clone(),
                self.metrics.clone(),
            );
            self.handles.extend(dlq_worker.start().await?);

            info!("DLQ worker pool started successfully");
        } else {
            info!("DLQ worker pool is disabled");
        }

        info!("Review Worker System initialization complete");
        Ok(())
    }

    /// Signal all workers to stop processing new jobs
    pub fn signal_shutdown(&self) {
        info!("Signaling shutdown to all worker pools");
        self.shutdown_signal.store(true, Ordering::SeqCst);
    }

    /// Wait for all workers to complete in-progress jobs and shut down
    /// gracefully. In-flight messages that miss the grace period rely on
    /// visibility expiry to be redelivered.
    pub async fn await_shutdown(&mut self) -> WorkerResult<()> {
        let grace_period = self.config.graceful_shutdown_timeout;
        let handles = std::mem::take(&mut self.handles);

        info!("Waiting up to {:?} for workers to shutdown gracefully", grace_period);

        match timeout(grace_period, join_all(handles)).await {
            Ok(_) => {
                info!("All worker pools shutdown gracefully");
                self.metrics.log_metrics();
                Ok(())
            }
            Err(_) => {
                error!("Worker shutdown timed out after {:?}", grace_period);
                Err(WorkerError::Shutdown)
            }
        }
    }

    /// Get a reference to the metrics collector
    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }
}
