use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::{PgArguments, PgQueryResult};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::analyzer::report::Report;
use crate::reviews::job::{Job, JobStatus, JobSummary};

const TRANSIENT_ATTEMPTS: u32 = 3;
const TRANSIENT_BACKOFF: Duration = Duration::from_millis(200);

fn is_transient(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

pub struct NewJob<'a> {
    pub id: Uuid,
    pub user_id: Option<i32>,
    pub code_hash: &'a str,
    pub file_name: &'a str,
    pub file_content: &'a str,
    pub status: JobStatus,
    pub result: Option<&'a Report>,
    pub cache_hit: bool,
}

/// Access layer for `review_jobs`. Every state transition is a conditional
/// single-row UPDATE so redeliveries can never overwrite a completed job.
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run a mutation, retrying transient backend failures a bounded number
    /// of times before surfacing the error to the caller.
    async fn execute_with_retry<'q, F>(&self, build: F) -> Result<PgQueryResult, sqlx::Error>
    where
        F: Fn() -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    {
        let mut attempt = 0;
        loop {
            match build().execute(&self.pool).await {
                Ok(result) => return Ok(result),
                Err(e) if is_transient(&e) && attempt + 1 < TRANSIENT_ATTEMPTS => {
                    attempt += 1;
                    warn!("job store write failed (attempt {}), retrying: {}", attempt, e);
                    sleep(TRANSIENT_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn create(&self, job: &NewJob<'_>) -> Result<(), sqlx::Error> {
        let completed_at = job.result.map(|_| Utc::now());
        let processing_time_ms = job.result.map(|_| 0i64);
        self.execute_with_retry(|| {
            sqlx::query(
                r#"
                INSERT INTO review_jobs (
                    id, user_id, code_hash, file_name, file_content,
                    status, result, cache_hit, attempts, completed_at, processing_time_ms
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10)
                "#,
            )
            .bind(job.id)
            .bind(job.user_id)
            .bind(job.code_hash)
            .bind(job.file_name)
            .bind(job.file_content)
            .bind(job.status)
            .bind(job.result.map(Json))
            .bind(job.cache_hit)
            .bind(completed_at)
            .bind(processing_time_ms)
        })
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>("SELECT * FROM review_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Returns false when the transition was refused, which happens when the
    /// job already completed on a previous delivery.
    pub async fn mark_processing(&self, id: Uuid, attempts: i32) -> Result<bool, sqlx::Error> {
        let result = self
            .execute_with_retry(|| {
                sqlx::query(
                    r#"
                    UPDATE review_jobs
                    SET status = 'processing', attempts = $2
                    WHERE id = $1 AND status NOT IN ('complete', 'dlq')
                    "#,
                )
                .bind(id)
                .bind(attempts)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// At-most-once completion: the guard refuses a second transition into
    /// `complete`, so a redelivered message cannot overwrite the result.
    pub async fn complete(
        &self,
        id: Uuid,
        report: &Report,
        duration_ms: i64,
        attempts: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = self
            .execute_with_retry(|| {
                sqlx::query(
                    r#"
                    UPDATE review_jobs
                    SET status = 'complete', result = $2, completed_at = NOW(),
                        processing_time_ms = $3, attempts = $4, last_error = NULL
                    WHERE id = $1 AND status != 'complete'
                    "#,
                )
                .bind(id)
                .bind(Json(report))
                .bind(duration_ms)
                .bind(attempts)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_retrying(&self, id: Uuid, attempts: i32, error: &str) -> Result<(), sqlx::Error> {
        self.execute_with_retry(|| {
            sqlx::query(
                r#"
                UPDATE review_jobs
                SET status = 'retrying', attempts = $2, last_error = $3
                WHERE id = $1 AND status NOT IN ('complete', 'dlq')
                "#,
            )
            .bind(id)
            .bind(attempts)
            .bind(error)
        })
        .await?;
        Ok(())
    }

    pub async fn mark_dlq(&self, id: Uuid, message_id: &str, error: &str) -> Result<(), sqlx::Error> {
        self.execute_with_retry(|| {
            sqlx::query(
                r#"
                UPDATE review_jobs
                SET status = 'dlq', dlq_message_id = $2, dlq_moved_at = NOW(), last_error = $3
                WHERE id = $1 AND status != 'complete'
                "#,
            )
            .bind(id)
            .bind(message_id)
            .bind(error)
        })
        .await?;
        Ok(())
    }

    /// Manual DLQ retry resets the job so status polls show it back in
    /// flight.
    pub async fn reset_for_retry(&self, id: Uuid) -> Result<(), sqlx::Error> {
        self.execute_with_retry(|| {
            sqlx::query(
                r#"
                UPDATE review_jobs
                SET status = 'retrying', dlq_message_id = NULL, dlq_moved_at = NULL
                WHERE id = $1 AND status != 'complete'
                "#,
            )
            .bind(id)
        })
        .await?;
        Ok(())
    }

    pub async fn history(&self, owner: i32, limit: i64) -> Result<Vec<JobSummary>, sqlx::Error> {
        sqlx::query_as::<_, JobSummary>(
            r#"
            SELECT id, file_name, status, cache_hit, processing_time_ms, created_at,
                   (result -> 'metrics' ->> 'issues_found')::bigint AS issues_found
            FROM review_jobs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Observability lookup: every job that carried this content.
    pub async fn find_by_code_hash(&self, code_hash: &str) -> Result<Vec<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM review_jobs WHERE code_hash = $1 ORDER BY created_at DESC",
        )
        .bind(code_hash)
        .fetch_all(&self.pool)
        .await
    }

    /// Queue-depth estimation and /stats totals.
    pub async fn count_by_status(&self) -> Result<Vec<(JobStatus, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM review_jobs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
    }
}
