use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::workers::WorkerResult;

/// Redis lock scoped to one review job. After a visibility lease expires
/// mid-processing, a redelivered message could be picked up while the
/// original worker is still analyzing; the lock keeps one analysis in
/// flight per job. The owner token ensures only the holder can release.
pub struct DistributedLock {
    connection_manager: ConnectionManager,
    lock_key: String,
    lock_value: String,
    lock_timeout: Duration,
}

impl DistributedLock {
    pub fn for_job(connection_manager: ConnectionManager, job_id: Uuid, lock_timeout: Duration) -> Self {
        Self {
            connection_manager,
            lock_key: format!("review_lock:{job_id}"),
            lock_value: Uuid::new_v4().to_string(),
            lock_timeout,
        }
    }

    pub async fn acquire(&mut self, retry_interval: Duration, max_wait: Duration) -> WorkerResult<bool> {
        let start_time = Instant::now();

        loop {
            // SET NX EX: only set if the key doesn't exist, with expiration
            let options = SetOptions::default()
                .conditional_set(ExistenceCheck::NX)
                .with_expiration(SetExpiry::EX(self.lock_timeout.as_secs() as usize));

            let acquired: bool = self
                .connection_manager
                .set_options(&self.lock_key, &self.lock_value, options)
                .await?;

            if acquired {
                debug!("Lock acquired: {}", self.lock_key);
                return Ok(true);
            }

            if start_time.elapsed() >= max_wait {
                warn!("Failed to acquire lock after {:?}: {}", max_wait, self.lock_key);
                return Ok(false);
            }

            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Release only if the key still holds our token, so an expired lock
    /// reacquired by another worker is never deleted from under them.
    pub async fn release(&mut self) -> WorkerResult<bool> {
        let script = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
        "#;

        let result: i32 = redis::Script::new(script)
            .key(&self.lock_key)
            .arg(&self.lock_value)
            .invoke_async(&mut self.connection_manager)
            .await?;

        let released = result == 1;
        if released {
            debug!("Lock released: {}", self.lock_key);
        } else {
            warn!("Failed to release lock (possibly expired): {}", self.lock_key);
        }

        Ok(released)
    }
}
