use actix_web::{web, HttpResponse};
use tracing::error;

use crate::models::ErrorResponse;
use crate::services::stats_service::StatsService;

#[actix_web::get("/health")]
pub async fn health(data: web::Data<StatsService>) -> HttpResponse {
    HttpResponse::Ok().json(data.health().await)
}

#[actix_web::get("/stats")]
pub async fn stats(data: web::Data<StatsService>) -> HttpResponse {
    match data.snapshot().await {
        Ok(snapshot) => HttpResponse::Ok().json(snapshot),
        Err(e) => {
            error!("Stats read failed: {:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal error".to_string(),
            })
        }
    }
}
