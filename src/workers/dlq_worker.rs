use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::dlq::dlq_repository::DlqRepository;
use crate::reviews::job::ReviewMessage;
use crate::reviews::job_repository::JobRepository;
use crate::workers::{ReceivedMessage, RedisQueue, WorkerConfig, WorkerMetrics, WorkerResult};

/// DlqWorker consumes the companion dead-letter queue: it records each
/// routed message durably, flips the job to its dead-lettered state, and
/// then deletes the message so it cannot loop.
#[derive(Clone)]
pub struct DlqWorker {
    config: WorkerConfig,
    queue: RedisQueue,
    jobs: JobRepository,
    dlq: DlqRepository,
    shutdown_signal: Arc<AtomicBool>,
    metrics: Arc<WorkerMetrics>,
}

impl DlqWorker {
    pub fn new(
        config: WorkerConfig,
        queue: RedisQueue,
        jobs: JobRepository,
        dlq: DlqRepository,
        shutdown_signal: Arc<AtomicBool>,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self { config, queue, jobs, dlq, shutdown_signal, metrics }
    }

    /// Start the DLQ worker pool with the configured number of threads
    pub async fn start(&self) -> WorkerResult<Vec<tokio::task::JoinHandle<()>>> {
        info!(
            "Starting DlqWorker with {} threads",
            self.config.dlq_worker_thread_count
        );

        let (tx, mut rx) = mpsc::channel(100);
        let mut handles = Vec::new();

        for i in 0..self.config.dlq_worker_thread_count {
            let worker_id = format!("dlq-worker-{}", i);
            let worker = self.clone();
            let thread_tx = tx.clone();

            let handle = tokio::spawn(async move {
                let result = worker.run_consumer(worker_id, thread_tx).await;
                if let Err(e) = result {
                    error!("DLQ worker thread exited with error: {}", e);
                }
            });
            handles.push(handle);
        }

        drop(tx);

        tokio::spawn(async move {
            let mut completed_count = 0;
            while let Some(worker_id) = rx.recv().await {
                info!("DLQ Worker {} completed graceful shutdown", worker_id);
                completed_count += 1;
            }
            info!("All {} DLQ worker threads completed graceful shutdown", completed_count);
        });

        Ok(handles)
    }

    #[instrument(skip(self, completion_tx), fields(worker_id = %worker_id))]
    async fn run_consumer(&self, worker_id: String, completion_tx: mpsc::Sender<String>) -> WorkerResult<()> {
        info!("DLQ worker thread started");

        loop {
            if self.shutdown_signal.load(Ordering::Relaxed) {
                info!("Shutdown signal received, stopping DLQ worker");
                break;
            }

            match self.queue.receive_dlq(self.config.dlq_wait_interval).await {
                Ok(Some(message)) => {
                    if let Err(e) = self.process_dlq_message(message).await {
                        error!("Error processing DLQ message: {}", e);
                    }
                }
                Ok(None) => {
                    debug!("No DLQ message available, continuing to poll");
                }
                Err(e) => {
                    error!("Error receiving from DLQ: {}", e);
                    sleep(std::time::Duration::from_millis(1000)).await;
                }
            }
        }

        if let Err(e) = completion_tx.send(worker_id.clone()).await {
            error!("Failed to signal DLQ worker completion: {}", e);
        }

        info!("DLQ worker thread exiting");
        Ok(())
    }

    #[instrument(skip(self, received), fields(message_id = %received.message_id))]
    async fn process_dlq_message(&self, received: ReceivedMessage) -> WorkerResult<()> {
        let message = match ReviewMessage::from_json(&received.body) {
            Ok(message) => message,
            Err(e) => {
                error!("Unreadable DLQ message {}, deleting: {}", received.message_id, e);
                self.metrics.record_parse_error();
                self.queue.delete(&received.receipt).await?;
                return Ok(());
            }
        };

        let last_error = match self.jobs.get(message.job_id).await {
            Ok(Some(job)) => job.last_error.unwrap_or_else(|| "analysis failed".to_string()),
            Ok(None) => "analysis failed".to_string(),
            Err(e) => {
                // Store unavailable; leave the message for a later pass.
                self.metrics.record_store_error();
                return Err(e.into());
            }
        };

        // The worker's terminal-failure path may already have recorded this
        // message; the insert is idempotent on the message id.
        let inserted = self
            .dlq
            .record(
                message.job_id,
                &received.message_id,
                &received.body,
                received.receive_count as i32,
                &last_error,
            )
            .await?;
        if inserted {
            warn!(
                "Job {} dead-lettered after {} receives: {}",
                message.job_id, received.receive_count, last_error
            );
        } else {
            debug!("DLQ entry for message {} already recorded", received.message_id);
        }

        self.jobs
            .mark_dlq(message.job_id, &received.message_id, &last_error)
            .await?;

        // Delete last: the entry and job update are idempotent, so a crash
        // before this point just reprocesses the message.
        self.queue.delete(&received.receipt).await?;
        self.metrics.record_job_moved_to_dlq();
        Ok(())
    }
}
