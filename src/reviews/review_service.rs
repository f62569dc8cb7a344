use std::collections::HashMap;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::analyzer::report::Report;
use crate::cache::ResultCache;
use crate::hasher;
use crate::reviews::job::{Job, JobStatus, JobSummary, ReviewMessage};
use crate::reviews::job_repository::{JobRepository, NewJob};
use crate::services::metrics_service::MetricsService;
use crate::services::stats_service::StatsService;
use crate::workers::RedisQueue;

pub const HISTORY_LIMIT_MAX: i64 = 50;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Front-end of the review pipeline: fingerprint, cache probe, job
/// creation, enqueue, and status read-out.
#[derive(Clone)]
pub struct ReviewService {
    jobs: JobRepository,
    cache: ResultCache,
    queue: RedisQueue,
    stats: StatsService,
    metrics: MetricsService,
    max_content_bytes: usize,
}

impl ReviewService {
    pub fn new(
        jobs: JobRepository,
        cache: ResultCache,
        queue: RedisQueue,
        stats: StatsService,
        metrics: MetricsService,
        max_content_bytes: usize,
    ) -> Self {
        Self { jobs, cache, queue, stats, metrics, max_content_bytes }
    }

    pub async fn submit(
        &self,
        file_name: &str,
        file_content: &str,
        owner: Option<i32>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let start = Instant::now();
        let mut tags = HashMap::new();
        tags.insert("endpoint".to_string(), "submit".to_string());

        if file_content.is_empty() {
            return Err(SubmitError::InvalidInput("file_content is required".to_string()));
        }
        if self.max_content_bytes > 0 && file_content.len() > self.max_content_bytes {
            return Err(SubmitError::InvalidInput(format!(
                "file_content exceeds {} bytes",
                self.max_content_bytes
            )));
        }

        let code_hash = hasher::fingerprint(file_content.as_bytes());
        let job_id = Uuid::new_v4();

        // Cache probe. A hit is answered synchronously, but the job record
        // is written first so status polls see a consistent view.
        if let Some(report) = self.cache.get(&code_hash).await {
            self.stats.record_cache_hit().await;

            self.jobs
                .create(&NewJob {
                    id: job_id,
                    user_id: owner,
                    code_hash: &code_hash,
                    file_name,
                    file_content,
                    status: JobStatus::Complete,
                    result: Some(&report),
                    cache_hit: true,
                })
                .await
                .context("creating cached job record")?;

            info!("Review {} answered from cache ({})", job_id, code_hash);
            self.metrics.increment("review_cache_hit", Some(tags.clone()));
            self.metrics.timing("api_latency", start.elapsed(), Some(tags));

            return Ok(SubmitOutcome {
                job_id,
                status: JobStatus::Complete,
                cache_hit: true,
                result: Some(report),
                message: None,
            });
        }

        self.stats.record_cache_miss().await;

        self.jobs
            .create(&NewJob {
                id: job_id,
                user_id: owner,
                code_hash: &code_hash,
                file_name,
                file_content,
                status: JobStatus::Queued,
                result: None,
                cache_hit: false,
            })
            .await
            .context("creating queued job record")?;

        let message = ReviewMessage {
            job_id,
            code_hash: code_hash.clone(),
            file_name: file_name.to_string(),
            file_content: file_content.to_string(),
        };
        let body = message.to_json().context("serializing review message")?;
        self.queue.enqueue(&body).await.context("enqueueing review message")?;

        info!("Review {} queued ({})", job_id, code_hash);
        self.metrics.increment("review_queued", Some(tags.clone()));
        self.metrics.timing("api_latency", start.elapsed(), Some(tags));

        Ok(SubmitOutcome {
            job_id,
            status: JobStatus::Queued,
            cache_hit: false,
            result: None,
            message: Some("Review queued for processing".to_string()),
        })
    }

    pub async fn status(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        self.jobs.get(job_id).await.context("reading job status")
    }

    pub async fn history(&self, owner: i32, limit: Option<i64>) -> anyhow::Result<Vec<JobSummary>> {
        let limit = limit.unwrap_or(HISTORY_LIMIT_MAX).clamp(1, HISTORY_LIMIT_MAX);
        self.jobs.history(owner, limit).await.context("reading job history")
    }
}
