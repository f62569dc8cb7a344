use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::analyzer::report::Report;

/// Review job lifecycle. Transitions are strictly monotonic: a completed
/// job is never moved back, and only the DLQ path may set `Dlq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Retrying,
    Complete,
    Dlq,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Complete => "complete",
            JobStatus::Dlq => "dlq",
        }
    }
}

/// One row in `review_jobs`; the single source of truth for job state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Option<i32>,
    pub code_hash: String,
    pub file_name: String,
    pub file_content: String,
    pub status: JobStatus,
    pub result: Option<Json<Report>>,
    pub cache_hit: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub dlq_message_id: Option<String>,
    pub dlq_moved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
}

/// Compact row for history listings; `issues_found` is projected out of the
/// stored report.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobSummary {
    pub id: Uuid,
    pub file_name: String,
    pub status: JobStatus,
    pub cache_hit: bool,
    pub processing_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub issues_found: Option<i64>,
}

/// Queue message body carried from submission to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewMessage {
    pub job_id: Uuid,
    pub code_hash: String,
    pub file_name: String,
    pub file_content: String,
}

impl ReviewMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
