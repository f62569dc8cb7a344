use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::warn;

use crate::reviews::job_repository::JobRepository;
use crate::workers::review_worker::WORKER_HEARTBEAT_PREFIX;
use crate::workers::RedisQueue;

const CACHE_HITS_KEY: &str = "coderev:stats:cache_hits";
const CACHE_MISSES_KEY: &str = "coderev:stats:cache_misses";

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub queue_depth: u64,
    pub dlq_depth: u64,
    pub active_workers: u64,
    pub totals: HashMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub cache_hit_rate: f64,
}

/// Operational statistics shared between the API and worker processes
/// through Redis counters, queue lengths, and worker heartbeat keys.
#[derive(Clone)]
pub struct StatsService {
    connection_manager: ConnectionManager,
    queue: RedisQueue,
    jobs: JobRepository,
}

impl StatsService {
    pub fn new(connection_manager: ConnectionManager, queue: RedisQueue, jobs: JobRepository) -> Self {
        Self { connection_manager, queue, jobs }
    }

    pub async fn record_cache_hit(&self) {
        let mut conn = self.connection_manager.clone();
        if let Err(e) = conn.incr::<_, _, ()>(CACHE_HITS_KEY, 1u64).await {
            warn!("Failed to count cache hit: {}", e);
        }
    }

    pub async fn record_cache_miss(&self) {
        let mut conn = self.connection_manager.clone();
        if let Err(e) = conn.incr::<_, _, ()>(CACHE_MISSES_KEY, 1u64).await {
            warn!("Failed to count cache miss: {}", e);
        }
    }

    async fn cache_counters(&self) -> (u64, u64) {
        let mut conn = self.connection_manager.clone();
        let hits: Option<u64> = conn.get(CACHE_HITS_KEY).await.unwrap_or(None);
        let misses: Option<u64> = conn.get(CACHE_MISSES_KEY).await.unwrap_or(None);
        (hits.unwrap_or(0), misses.unwrap_or(0))
    }

    fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let (hits, misses) = self.cache_counters().await;
        HealthSnapshot {
            status: "ok",
            timestamp: Utc::now(),
            cache_hit_rate: Self::hit_rate(hits, misses),
        }
    }

    async fn active_workers(&self) -> u64 {
        let mut conn = self.connection_manager.clone();
        let pattern = format!("{WORKER_HEARTBEAT_PREFIX}:*");
        let mut count = 0;
        match conn.scan_match::<_, String>(pattern).await {
            Ok(mut iter) => {
                while iter.next_item().await.is_some() {
                    count += 1;
                }
            }
            Err(e) => warn!("Failed to scan worker heartbeats: {}", e),
        }
        count
    }

    pub async fn snapshot(&self) -> anyhow::Result<StatsSnapshot> {
        let (hits, misses) = self.cache_counters().await;
        let queue_depth = self.queue.queue_depth().await.unwrap_or(0);
        let dlq_depth = self.queue.dlq_depth().await.unwrap_or(0);
        let active_workers = self.active_workers().await;

        let mut totals = HashMap::new();
        for (status, count) in self.jobs.count_by_status().await? {
            totals.insert(status.as_str().to_string(), count);
        }

        Ok(StatsSnapshot {
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: Self::hit_rate(hits, misses),
            queue_depth,
            dlq_depth,
            active_workers,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_handles_empty_counters() {
        assert_eq!(StatsService::hit_rate(0, 0), 0.0);
        assert_eq!(StatsService::hit_rate(3, 1), 0.75);
    }
}
