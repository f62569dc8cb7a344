use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

use crate::models::user::{AuthResponse, LoginRequest, RegisterRequest};
use crate::repositories::user_repository::UserRepository;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct AuthService {
    user_repository: UserRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt_secret: String) -> Self {
        Self {
            user_repository: UserRepository::new(pool),
            jwt_secret,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        if self
            .user_repository
            .find_by_email(&request.email)
            .await
            .map_err(anyhow::Error::from)?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(request.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
            .to_string();

        let user = self
            .user_repository
            .create(&request.name, &request.email, &password_hash)
            .await
            .map_err(anyhow::Error::from)?;

        self.generate_token(user.id)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .user_repository
            .find_by_email(&request.email)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| anyhow::anyhow!("stored password hash unreadable: {e}"))?;
        if Argon2::default()
            .verify_password(request.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Err(AuthError::InvalidCredentials);
        }

        self.generate_token(user.id)
    }

    fn generate_token(&self, user_id: i32) -> Result<AuthResponse, AuthError> {
        let expiration = Utc::now() + Duration::hours(24);
        let claims = Claims {
            sub: user_id,
            exp: expiration.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| anyhow::anyhow!("token encoding failed: {e}"))?;

        Ok(AuthResponse {
            token,
            expired_at: expiration,
        })
    }
}
