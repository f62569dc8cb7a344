pub mod config;
pub mod queue;
pub mod main_worker;
pub mod review_worker;
pub mod dlq_worker;
pub mod distributed_lock;
pub mod metrics;
pub mod error;

pub use config::WorkerConfig;
pub use queue::{ReceivedMessage, Receipt, RedisQueue};
pub use main_worker::MainWorker;
pub use review_worker::ReviewWorker;
pub use dlq_worker::DlqWorker;
pub use distributed_lock::DistributedLock;
pub use metrics::WorkerMetrics;
pub use error::{WorkerError, WorkerResult};
