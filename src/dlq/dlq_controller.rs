use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::dlq::dlq_service::DlqService;
use crate::models::ErrorResponse;

#[derive(Debug, Deserialize)]
pub struct DlqListQuery {
    pub resolved: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub reason: String,
}

fn internal_error(context: &str, e: anyhow::Error) -> HttpResponse {
    error!("{}: {:#}", context, e);
    HttpResponse::InternalServerError().json(ErrorResponse { error: "internal error".to_string() })
}

fn not_found(id: Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse { error: format!("DLQ entry {} not found", id) })
}

#[actix_web::get("/dlq")]
pub async fn list(service: web::Data<DlqService>, query: web::Query<DlqListQuery>) -> HttpResponse {
    match service
        .list(query.resolved, query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await
    {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(e) => internal_error("DLQ list failed", e),
    }
}

#[actix_web::get("/dlq/stats")]
pub async fn stats(service: web::Data<DlqService>) -> HttpResponse {
    match service.stats().await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => internal_error("DLQ stats failed", e),
    }
}

#[actix_web::get("/dlq/{id}")]
pub async fn get(service: web::Data<DlqService>, path: web::Path<Uuid>) -> HttpResponse {
    let id = path.into_inner();
    match service.get(id).await {
        Ok(Some(entry)) => HttpResponse::Ok().json(entry),
        Ok(None) => not_found(id),
        Err(e) => internal_error("DLQ read failed", e),
    }
}

#[actix_web::post("/dlq/{id}/retry")]
pub async fn retry(service: web::Data<DlqService>, path: web::Path<Uuid>) -> HttpResponse {
    let id = path.into_inner();
    match service.retry(id).await {
        Ok(Some(entry)) => HttpResponse::Ok().json(entry),
        Ok(None) => not_found(id),
        Err(e) => internal_error("DLQ retry failed", e),
    }
}

#[actix_web::post("/dlq/{id}/resolve")]
pub async fn resolve(
    service: web::Data<DlqService>,
    path: web::Path<Uuid>,
    request: web::Json<ResolveRequest>,
) -> HttpResponse {
    let id = path.into_inner();
    match service.resolve(id, &request.reason).await {
        Ok(Some(entry)) => HttpResponse::Ok().json(entry),
        Ok(None) => not_found(id),
        Err(e) => internal_error("DLQ resolve failed", e),
    }
}
