use actix_web::{web, HttpResponse};
use sqlx::PgPool;
use tracing::error;
use validator::Validate;

use crate::config::AppConfig;
use crate::models::user::{LoginRequest, RegisterRequest};
use crate::models::ErrorResponse;
use crate::services::auth_service::{AuthError, AuthService};

fn auth_error_response(e: AuthError) -> HttpResponse {
    match e {
        AuthError::EmailTaken | AuthError::InvalidCredentials => {
            HttpResponse::UnprocessableEntity().json(ErrorResponse { error: e.to_string() })
        }
        AuthError::Internal(e) => {
            error!("Auth failure: {:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal error".to_string(),
            })
        }
    }
}

#[actix_web::post("/auth/register")]
pub async fn register(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    request: web::Json<RegisterRequest>,
) -> HttpResponse {
    if request.validate().is_err() {
        return HttpResponse::UnprocessableEntity().json(ErrorResponse {
            error: "invalid name, email, or password".to_string(),
        });
    }

    let auth_service = AuthService::new(pool.get_ref().clone(), config.jwt_secret.clone());
    match auth_service.register(request.into_inner()).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => auth_error_response(e),
    }
}

#[actix_web::post("/auth/login")]
pub async fn login(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> HttpResponse {
    if request.validate().is_err() {
        return HttpResponse::UnprocessableEntity().json(ErrorResponse {
            error: "invalid email or password".to_string(),
        });
    }

    let auth_service = AuthService::new(pool.get_ref().clone(), config.jwt_secret.clone());
    match auth_service.login(request.into_inner()).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => auth_error_response(e),
    }
}
