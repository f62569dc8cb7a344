use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Review worker pool configuration
    pub review_worker_thread_enabled: bool,
    pub review_worker_thread_count: usize,
    pub long_poll_interval: Duration,
    pub max_receive_count: u32,
    pub visibility_timeout: Duration,

    // DLQ handler pool configuration
    pub dlq_worker_thread_enabled: bool,
    pub dlq_worker_thread_count: usize,
    pub dlq_wait_interval: Duration,

    // Redis configuration
    pub redis_url: String,
    pub review_queue: String,
    pub review_dlq: String,
    pub queue_retention: Duration,
    pub dlq_retention: Duration,

    // Lock configuration
    pub lock_timeout: Duration,
    pub lock_retry_interval: Duration,

    // Shutdown configuration
    pub graceful_shutdown_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            review_worker_thread_enabled: env::var("REVIEW_WORKER_THREAD_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            review_worker_thread_count: env::var("REVIEW_WORKER_CONSUMER_THREAD_COUNT")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,

            long_poll_interval: Duration::from_secs(
                env::var("QUEUE_LONG_POLL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            ),

            max_receive_count: env::var("MAX_RECEIVE_COUNT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            visibility_timeout: Duration::from_secs(
                env::var("VISIBILITY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            ),

            dlq_worker_thread_enabled: env::var("DLQ_WORKER_THREAD_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            dlq_worker_thread_count: env::var("DLQ_WORKER_THREAD_COUNT")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,

            dlq_wait_interval: Duration::from_secs(
                env::var("DLQ_WAIT_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            review_queue: env::var("REVIEW_QUEUE")
                .unwrap_or_else(|_| "review_queue".to_string()),

            review_dlq: env::var("REVIEW_DLQ").unwrap_or_else(|_| "review_dlq".to_string()),

            queue_retention: Duration::from_secs(
                env::var("QUEUE_RETENTION_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()?,
            ),

            dlq_retention: Duration::from_secs(
                env::var("DLQ_RETENTION_SECONDS")
                    .unwrap_or_else(|_| "1209600".to_string())
                    .parse()?,
            ),

            lock_timeout: Duration::from_secs(
                env::var("WORKER_LOCK_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            ),

            lock_retry_interval: Duration::from_millis(
                env::var("WORKER_LOCK_RETRY_INTERVAL_MILLISECONDS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()?,
            ),

            graceful_shutdown_timeout: Duration::from_secs(
                env::var("WORKER_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            ),
        })
    }
}
