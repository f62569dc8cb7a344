use thiserror::Error;

use crate::analyzer::AnalysisError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Worker shutdown")]
    Shutdown,

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
