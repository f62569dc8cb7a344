use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::analyzer::report::Report;
use crate::models::ErrorResponse;
use crate::reviews::job::JobStatus;
use crate::reviews::review_service::{ReviewService, SubmitError};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub file_name: String,
    pub file_content: String,
    pub owner: Option<i32>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    id: Uuid,
    status: JobStatus,
    result: Option<Report>,
    cache_hit: bool,
    processing_time_ms: Option<i64>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub owner: Option<i32>,
    pub limit: Option<i64>,
}

#[actix_web::post("/reviews/submit")]
pub async fn submit(
    service: web::Data<ReviewService>,
    request: web::Json<SubmitRequest>,
) -> HttpResponse {
    match service
        .submit(&request.file_name, &request.file_content, request.owner)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(SubmitError::InvalidInput(message)) => {
            HttpResponse::BadRequest().json(ErrorResponse { error: message })
        }
        Err(SubmitError::Internal(e)) => {
            error!("Submit failed: {:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal error".to_string(),
            })
        }
    }
}

#[actix_web::get("/reviews/status/{job_id}")]
pub async fn status(service: web::Data<ReviewService>, path: web::Path<Uuid>) -> HttpResponse {
    let job_id = path.into_inner();
    match service.status(job_id).await {
        Ok(Some(job)) => HttpResponse::Ok().json(StatusResponse {
            id: job.id,
            status: job.status,
            result: job.result.map(|r| r.0),
            cache_hit: job.cache_hit,
            processing_time_ms: job.processing_time_ms,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: format!("job {} not found", job_id),
        }),
        Err(e) => {
            error!("Status read failed: {:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal error".to_string(),
            })
        }
    }
}

#[actix_web::get("/reviews/history")]
pub async fn history(service: web::Data<ReviewService>, query: web::Query<HistoryQuery>) -> HttpResponse {
    let Some(owner) = query.owner else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "owner query parameter is required".to_string(),
        });
    };

    match service.history(owner, query.limit).await {
        Ok(summaries) => HttpResponse::Ok().json(summaries),
        Err(e) => {
            error!("History read failed: {:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal error".to_string(),
            })
        }
    }
}
