use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// One row in `dlq_messages`: a durable record of a message that exhausted
/// its retry budget, unique per queue message id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DlqEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub message_id: String,
    pub message_body: String,
    pub receive_count: i32,
    pub last_error: String,
    pub moved_to_dlq_at: DateTime<Utc>,
    pub retry_count: i32,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DlqStats {
    pub total: i64,
    pub unresolved: i64,
    pub unique_jobs: i64,
    pub latest_moved_at: Option<DateTime<Utc>>,
    pub avg_retry_count: Option<f64>,
}

#[derive(Clone)]
pub struct DlqRepository {
    pool: PgPool,
}

impl DlqRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent insert keyed on the queue message id. Both the worker's
    /// terminal-failure path and the DLQ handler record entries; whichever
    /// lands second is a no-op. Returns whether a row was created.
    pub async fn record(
        &self,
        job_id: Uuid,
        message_id: &str,
        message_body: &str,
        receive_count: i32,
        last_error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO dlq_messages (
                id, job_id, message_id, message_body, receive_count, last_error
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(message_id)
        .bind(message_body)
        .bind(receive_count)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list(
        &self,
        resolved: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DlqEntry>, sqlx::Error> {
        sqlx::query_as::<_, DlqEntry>(
            r#"
            SELECT * FROM dlq_messages
            WHERE ($1::boolean IS NULL OR resolved = $1)
            ORDER BY moved_to_dlq_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(resolved)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<DlqEntry>, sqlx::Error> {
        sqlx::query_as::<_, DlqEntry>("SELECT * FROM dlq_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn stats(&self) -> Result<DlqStats, sqlx::Error> {
        sqlx::query_as::<_, DlqStats>(
            r#"
            SELECT COUNT(*)                                   AS total,
                   COUNT(*) FILTER (WHERE NOT resolved)       AS unresolved,
                   COUNT(DISTINCT job_id)                     AS unique_jobs,
                   MAX(moved_to_dlq_at)                       AS latest_moved_at,
                   AVG(retry_count)::float8                   AS avg_retry_count
            FROM dlq_messages
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    /// Idempotent resolve: the first call stamps `resolved_at`, repeated
    /// calls keep the original timestamp and the given reason.
    pub async fn resolve(&self, id: Uuid, reason: &str) -> Result<Option<DlqEntry>, sqlx::Error> {
        sqlx::query_as::<_, DlqEntry>(
            r#"
            UPDATE dlq_messages
            SET resolved = TRUE,
                resolved_at = COALESCE(resolved_at, NOW()),
                resolution_reason = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    /// Counts a manual requeue issued from the operational surface.
    pub async fn increment_retry(&self, id: Uuid) -> Result<Option<DlqEntry>, sqlx::Error> {
        sqlx::query_as::<_, DlqEntry>(
            r#"
            UPDATE dlq_messages
            SET retry_count = retry_count + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}
