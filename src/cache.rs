use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::analyzer::report::Report;

/// Read-through result cache keyed by content fingerprint, shared between
/// the API process and the workers through Redis.
///
/// Lookups never fail the caller: a degraded cache backend reads as a miss
/// and the submission recomputes. Writes are best-effort; writers for the
/// same fingerprint produce value-equal reports, so last-writer-wins is
/// acceptable.
#[derive(Clone)]
pub struct ResultCache {
    connection_manager: ConnectionManager,
    ttl_seconds: u64,
    key_prefix: String,
}

impl ResultCache {
    pub fn new(connection_manager: ConnectionManager, ttl_seconds: u64, key_prefix: String) -> Self {
        Self { connection_manager, ttl_seconds, key_prefix }
    }

    fn key(&self, fingerprint: &str) -> String {
        format!("{}:{}", self.key_prefix, fingerprint)
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Report> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = match conn.get(self.key(fingerprint)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(report) => {
                debug!("cache hit for {}", fingerprint);
                Some(report)
            }
            Err(e) => {
                warn!("cached report for {} is unreadable, treating as miss: {}", fingerprint, e);
                None
            }
        }
    }

    pub async fn put(&self, fingerprint: &str, report: &Report) {
        let payload = match serde_json::to_string(report) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to serialize report for cache: {}", e);
                return;
            }
        };

        let mut conn = self.connection_manager.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(self.key(fingerprint), payload, self.ttl_seconds)
            .await
        {
            warn!("cache write for {} failed: {}", fingerprint, e);
        }
    }
}
