use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use crate::dlq::dlq_repository::{DlqEntry, DlqRepository, DlqStats};
use crate::reviews::job_repository::JobRepository;
use crate::workers::RedisQueue;

/// Operational surface over dead-lettered messages: inspect, resolve, and
/// manually feed a message back into the main queue.
#[derive(Clone)]
pub struct DlqService {
    dlq_repository: DlqRepository,
    job_repository: JobRepository,
    queue: RedisQueue,
}

impl DlqService {
    pub fn new(dlq_repository: DlqRepository, job_repository: JobRepository, queue: RedisQueue) -> Self {
        Self { dlq_repository, job_repository, queue }
    }

    pub async fn list(
        &self,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<DlqEntry>> {
        self.dlq_repository
            .list(resolved, limit.clamp(1, 100), offset.max(0))
            .await
            .context("listing DLQ entries")
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<DlqEntry>> {
        self.dlq_repository.get(id).await.context("reading DLQ entry")
    }

    pub async fn stats(&self) -> anyhow::Result<DlqStats> {
        self.dlq_repository.stats().await.context("reading DLQ stats")
    }

    pub async fn resolve(&self, id: Uuid, reason: &str) -> anyhow::Result<Option<DlqEntry>> {
        let entry = self.dlq_repository.resolve(id, reason).await.context("resolving DLQ entry")?;
        if entry.is_some() {
            info!("DLQ entry {} resolved: {}", id, reason);
        }
        Ok(entry)
    }

    /// Resend the verbatim message body to the main queue, count the manual
    /// retry, and put the job back into a retrying state so status polls
    /// reflect the requeue.
    pub async fn retry(&self, id: Uuid) -> anyhow::Result<Option<DlqEntry>> {
        let Some(entry) = self.dlq_repository.get(id).await.context("reading DLQ entry")? else {
            return Ok(None);
        };

        self.queue
            .resend_to_main(&entry.message_body)
            .await
            .context("requeueing DLQ message body")?;

        let updated = self
            .dlq_repository
            .increment_retry(id)
            .await
            .context("counting DLQ retry")?;

        self.job_repository
            .reset_for_retry(entry.job_id)
            .await
            .context("resetting job for retry")?;

        info!("DLQ entry {} requeued for job {}", id, entry.job_id);
        Ok(updated)
    }
}
