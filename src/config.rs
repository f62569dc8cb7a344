use std::env;
use std::time::Duration;

use crate::analyzer::ai::AiConfig;
use crate::analyzer::AnalyzerConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub bind_host: String,
    pub bind_port: u16,

    // Result cache
    pub cache_ttl_seconds: u64,
    pub cache_key_prefix: String,

    // Submission validation
    pub max_content_bytes: usize,

    // Auth
    pub jwt_secret: String,

    // Statsd (optional; metrics are skipped when unset)
    pub statsd_addr: Option<String>,

    // Analyzer / AI review
    pub enable_ai: bool,
    pub ai_provider: String,
    pub ai_model: String,
    pub ai_api_key: String,
    pub ai_request_timeout: Duration,
    pub min_file_lines_for_ai: u32,
    pub max_file_lines_for_ai: u32,
    pub allow_force_fail: bool,
    pub linter_command: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/coderev".to_string()),

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            bind_host: env::var("BIND_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),

            bind_port: env::var("BIND_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,

            cache_ttl_seconds: env::var("CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,

            cache_key_prefix: env::var("CACHE_KEY_PREFIX")
                .unwrap_or_else(|_| "review_cache".to_string()),

            max_content_bytes: env::var("MAX_CONTENT_BYTES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,

            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),

            statsd_addr: env::var("STATSD_ADDR").ok(),

            enable_ai: env::var("ENABLE_AI")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            ai_provider: env::var("AI_PROVIDER")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),

            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            ai_api_key: env::var("AI_API_KEY").unwrap_or_default(),

            ai_request_timeout: Duration::from_millis(
                env::var("AI_REQUEST_TIMEOUT_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()?,
            ),

            min_file_lines_for_ai: env::var("MIN_FILE_LINES_FOR_AI")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            max_file_lines_for_ai: env::var("MAX_FILE_LINES_FOR_AI")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            allow_force_fail: env::var("ALLOW_FORCE_FAIL")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,

            linter_command: env::var("LINTER_COMMAND").ok().filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            ai: AiConfig {
                enabled: self.enable_ai,
                provider_url: self.ai_provider.clone(),
                model: self.ai_model.clone(),
                api_key: self.ai_api_key.clone(),
                request_timeout: self.ai_request_timeout,
                min_file_lines: self.min_file_lines_for_ai,
                max_file_lines: self.max_file_lines_for_ai,
            },
            linter_command: self.linter_command.clone(),
            allow_force_fail: self.allow_force_fail,
        }
    }
}
