use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::cache::ResultCache;
use crate::dlq::dlq_repository::DlqRepository;
use crate::reviews::job::{JobStatus, ReviewMessage};
use crate::reviews::job_repository::JobRepository;
use crate::workers::{
    DistributedLock, ReceivedMessage, RedisQueue, WorkerConfig, WorkerMetrics, WorkerResult,
};

pub const WORKER_HEARTBEAT_PREFIX: &str = "coderev:workers";
const HEARTBEAT_TTL_SECONDS: u64 = 30;

/// ReviewWorker processes review jobs from the main queue: analyze, cache,
/// complete, and participate in the retry/DLQ protocol.
#[derive(Clone)]
pub struct ReviewWorker {
    config: WorkerConfig,
    queue: RedisQueue,
    jobs: JobRepository,
    cache: ResultCache,
    dlq: DlqRepository,
    analyzer: Arc<Analyzer>,
    connection_manager: ConnectionManager,
    shutdown_signal: Arc<AtomicBool>,
    metrics: Arc<WorkerMetrics>,
}

impl ReviewWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerConfig,
        queue: RedisQueue,
        jobs: JobRepository,
        cache: ResultCache,
        dlq: DlqRepository,
        analyzer: Arc<Analyzer>,
        connection_manager: ConnectionManager,
        shutdown_signal: Arc<AtomicBool>,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            config,
            queue,
            jobs,
            cache,
            dlq,
            analyzer,
            connection_manager,
            shutdown_signal,
            metrics,
        }
    }

    /// Start the worker pool with the configured number of threads,
    /// returning the consumer handles so the coordinator can join them on
    /// shutdown.
    pub async fn start(&self) -> WorkerResult<Vec<tokio::task::JoinHandle<()>>> {
        info!(
            "Starting ReviewWorker with {} threads",
            self.config.review_worker_thread_count
        );

        let (tx, mut rx) = mpsc::channel(100);
        let mut handles = Vec::new();

        for i in 0..self.config.review_worker_thread_count {
            let worker_id = format!("review-worker-{}", i);
            let worker = self.clone();
            let thread_tx = tx.clone();

            let handle = tokio::spawn(async move {
                let result = worker.run_consumer(worker_id, thread_tx).await;
                if let Err(e) = result {
                    error!("Worker thread exited with error: {}", e);
                }
            });
            handles.push(handle);
        }

        drop(tx);

        // Periodically refresh queue-depth metrics from this pool
        let queue = self.queue.clone();
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown_signal.clone();
        tokio::spawn(async move {
            while !shutdown.load(Ordering::Relaxed) {
                if let (Ok(main_depth), Ok(dlq_depth)) =
                    (queue.queue_depth().await, queue.dlq_depth().await)
                {
                    metrics.update_queue_depth(main_depth, dlq_depth);
                }
                sleep(std::time::Duration::from_secs(60)).await;
            }
        });

        tokio::spawn(async move {
            let mut completed_count = 0;
            while let Some(worker_id) = rx.recv().await {
                info!("Worker {} completed graceful shutdown", worker_id);
                completed_count += 1;
            }
            info!("All {} worker threads completed graceful shutdown", completed_count);
        });

        Ok(handles)
    }

    #[instrument(skip(self, completion_tx), fields(worker_id = %worker_id))]
    async fn run_consumer(&self, worker_id: String, completion_tx: mpsc::Sender<String>) -> WorkerResult<()> {
        info!("Worker thread started");

        // Heartbeat identity must be unique across worker processes, not
        // just across threads of this one.
        let heartbeat_id = format!("{}-{}", worker_id, Uuid::new_v4());

        loop {
            if self.shutdown_signal.load(Ordering::Relaxed) {
                info!("Shutdown signal received, stopping worker");
                break;
            }

            self.heartbeat(&heartbeat_id).await;

            match self.queue.receive(self.config.long_poll_interval).await {
                Ok(Some(message)) => {
                    if let Err(e) = self.process_message(message).await {
                        // The message stays invisible until its lease
                        // expires, then redelivers.
                        error!("Error processing message: {}", e);
                    }
                }
                Ok(None) => {
                    debug!("No message available, continuing to poll");
                }
                Err(e) => {
                    error!("Error receiving from queue: {}", e);
                    let jitter = rand::thread_rng().gen_range(0..500);
                    sleep(std::time::Duration::from_millis(1000 + jitter)).await;
                }
            }
        }

        if let Err(e) = completion_tx.send(worker_id.clone()).await {
            error!("Failed to signal worker completion: {}", e);
        }

        info!("Worker thread exiting");
        Ok(())
    }

    /// Liveness marker consumed by the /stats endpoint.
    async fn heartbeat(&self, worker_id: &str) {
        let mut conn = self.connection_manager.clone();
        let key = format!("{WORKER_HEARTBEAT_PREFIX}:{worker_id}");
        if let Err(e) = conn.set_ex::<_, _, ()>(key, 1u8, HEARTBEAT_TTL_SECONDS).await {
            debug!("Worker heartbeat failed: {}", e);
        }
    }

    #[instrument(skip(self, received), fields(message_id = %received.message_id))]
    async fn process_message(&self, received: ReceivedMessage) -> WorkerResult<()> {
        let _timer = self.metrics.start_timer();
        self.metrics.record_job_processed();

        // Malformed bodies can never succeed; delete instead of cycling
        // them through the retry budget.
        let message = match ReviewMessage::from_json(&received.body) {
            Ok(message) => message,
            Err(e) => {
                error!("Malformed message {}, deleting: {}", received.message_id, e);
                self.metrics.record_parse_error();
                self.queue.delete(&received.receipt).await?;
                return Ok(());
            }
        };

        if received.receive_count >= self.config.max_receive_count {
            warn!(
                "Job {} is on its terminal attempt ({} of {})",
                message.job_id, received.receive_count, self.config.max_receive_count
            );
        }

        // At-least-once delivery: a crash after completion but before
        // delete redelivers the message. Detect and short-circuit.
        match self.jobs.get(message.job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Complete => {
                info!("Job {} already complete, deleting redelivered message", message.job_id);
                self.queue.delete(&received.receipt).await?;
                return Ok(());
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Job {} has no record, deleting message", message.job_id);
                self.queue.delete(&received.receipt).await?;
                return Ok(());
            }
            Err(e) => {
                self.metrics.record_store_error();
                return Err(e.into()); // store down; leave for redelivery
            }
        }

        let transitioned = match self
            .jobs
            .mark_processing(message.job_id, received.receive_count as i32)
            .await
        {
            Ok(transitioned) => transitioned,
            Err(e) => {
                self.metrics.record_store_error();
                return Err(e.into());
            }
        };
        if !transitioned {
            // Job already finalized (dead-lettered); the transport will
            // route this stale message on its next receive.
            warn!("Job {} is already finalized, leaving message", message.job_id);
            return Ok(());
        }

        // Suppress duplicate analysis when a lease expired while the
        // original worker is still on this job.
        let mut lock = DistributedLock::for_job(
            self.connection_manager.clone(),
            message.job_id,
            self.config.lock_timeout,
        );
        let acquired = lock
            .acquire(self.config.lock_retry_interval, self.config.long_poll_interval)
            .await?;
        if !acquired {
            warn!("Job {} is locked by another worker, leaving message", message.job_id);
            return Ok(());
        }

        let outcome = self.run_analysis(&message, &received).await;
        if let Err(e) = lock.release().await {
            warn!("Failed to release lock for job {}: {}", message.job_id, e);
        }
        outcome
    }

    async fn run_analysis(
        &self,
        message: &ReviewMessage,
        received: &ReceivedMessage,
    ) -> WorkerResult<()> {
        let started = Instant::now();

        match self
            .analyzer
            .analyze(&message.file_content, &message.file_name)
            .await
        {
            Ok(report) => {
                // Cache first: a crash between the two writes only costs a
                // recomputation, never a wrong result.
                self.cache.put(&message.code_hash, &report).await;

                let duration_ms = started.elapsed().as_millis() as i64;
                let completed = match self
                    .jobs
                    .complete(
                        message.job_id,
                        &report,
                        duration_ms,
                        received.receive_count as i32,
                    )
                    .await
                {
                    Ok(completed) => completed,
                    Err(e) => {
                        self.metrics.record_store_error();
                        return Err(e.into());
                    }
                };

                if !completed {
                    info!("Job {} completed elsewhere, result kept as-is", message.job_id);
                }

                self.queue.delete(&received.receipt).await?;
                self.metrics.record_job_succeeded();
                info!(
                    "Job {} completed in {:?} (attempt {})",
                    message.job_id,
                    started.elapsed(),
                    received.receive_count
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_job_failed();
                let error_text = e.to_string();

                if received.receive_count >= self.config.max_receive_count {
                    // Terminal failure. Record the entry and flip the job
                    // now; the message itself must stay so the transport
                    // routes it to the companion DLQ.
                    if let Err(store_err) = self
                        .dlq
                        .record(
                            message.job_id,
                            &received.message_id,
                            &received.body,
                            received.receive_count as i32,
                            &error_text,
                        )
                        .await
                    {
                        self.metrics.record_store_error();
                        error!("Failed to record DLQ entry for job {}: {}", message.job_id, store_err);
                    }
                    if let Err(store_err) = self
                        .jobs
                        .mark_dlq(message.job_id, &received.message_id, &error_text)
                        .await
                    {
                        self.metrics.record_store_error();
                        error!("Failed to mark job {} as dead-lettered: {}", message.job_id, store_err);
                    }
                    self.metrics.record_job_moved_to_dlq();
                    warn!(
                        "Job {} failed terminally after {} attempts: {}",
                        message.job_id, received.receive_count, error_text
                    );
                } else {
                    if let Err(store_err) = self
                        .jobs
                        .mark_retrying(
                            message.job_id,
                            received.receive_count as i32,
                            &error_text,
                        )
                        .await
                    {
                        self.metrics.record_store_error();
                        error!("Failed to mark job {} retrying: {}", message.job_id, store_err);
                    }
                    self.metrics.record_job_retried();
                    warn!(
                        "Job {} failed (attempt {}/{}), leaving message for redelivery: {}",
                        message.job_id,
                        received.receive_count,
                        self.config.max_receive_count,
                        error_text
                    );
                }
                Ok(())
            }
        }
    }
}
