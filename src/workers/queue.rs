use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::workers::{WorkerConfig, WorkerResult};

/// At-least-once message transport over Redis.
///
/// Layout per channel (main queue and companion DLQ):
/// - `<name>` — pending list of message ids (LPUSH producer, BRPOP consumer)
/// - `<name>:inflight` — sorted set of received ids scored by lease deadline
/// - `<name>:msg:<id>` — message hash (`body`, `receive_count`), expiring at
///   the channel's retention
///
/// A received message stays invisible until its lease deadline; expired
/// leases are requeued before each poll. Receiving increments the
/// per-message receive count, and a count past `max_receive_count` routes
/// the message to the companion DLQ instead of delivering it.
#[derive(Clone)]
pub struct RedisQueue {
    connection_manager: ConnectionManager,
    queue_name: String,
    dlq_name: String,
    visibility: Duration,
    max_receive_count: u32,
    queue_retention: Duration,
    dlq_retention: Duration,
}

/// Transient ownership token for one received message. Deletion compares
/// the lease deadline so a stale receipt cannot destroy a message that has
/// already been redelivered to someone else.
#[derive(Debug, Clone)]
pub struct Receipt {
    channel: String,
    message_id: String,
    lease_deadline: i64,
}

#[derive(Debug)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: String,
    pub receive_count: u32,
    pub receipt: Receipt,
}

fn msg_key(channel: &str, message_id: &str) -> String {
    format!("{channel}:msg:{message_id}")
}

fn inflight_key(channel: &str) -> String {
    format!("{channel}:inflight")
}

impl RedisQueue {
    pub async fn new(config: &WorkerConfig) -> WorkerResult<Self> {
        let client = redis::Client::open(&config.redis_url[..])?;
        let connection_manager = ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            queue_name: config.review_queue.clone(),
            dlq_name: config.review_dlq.clone(),
            visibility: config.visibility_timeout,
            max_receive_count: config.max_receive_count,
            queue_retention: config.queue_retention,
            dlq_retention: config.dlq_retention,
        })
    }

    pub fn from_connection(connection_manager: ConnectionManager, config: &WorkerConfig) -> Self {
        Self {
            connection_manager,
            queue_name: config.review_queue.clone(),
            dlq_name: config.review_dlq.clone(),
            visibility: config.visibility_timeout,
            max_receive_count: config.max_receive_count,
            queue_retention: config.queue_retention,
            dlq_retention: config.dlq_retention,
        }
    }

    pub async fn enqueue(&self, body: &str) -> WorkerResult<String> {
        let message_id = Uuid::new_v4().to_string();
        let mut conn = self.connection_manager.clone();
        let key = msg_key(&self.queue_name, &message_id);

        conn.hset_multiple::<_, _, _, ()>(&key, &[("body", body), ("receive_count", "0")])
            .await?;
        conn.expire::<_, ()>(&key, self.queue_retention.as_secs() as i64).await?;
        conn.lpush::<_, _, ()>(&self.queue_name, &message_id).await?;

        info!("Message {} enqueued to {}", message_id, self.queue_name);
        Ok(message_id)
    }

    /// Requeue used by the DLQ handler's manual retry: the body re-enters
    /// the main queue as a fresh message with a fresh receive count.
    pub async fn resend_to_main(&self, body: &str) -> WorkerResult<String> {
        self.enqueue(body).await
    }

    pub async fn receive(&self, max_wait: Duration) -> WorkerResult<Option<ReceivedMessage>> {
        self.receive_from(&self.queue_name, max_wait, true).await
    }

    pub async fn receive_dlq(&self, max_wait: Duration) -> WorkerResult<Option<ReceivedMessage>> {
        self.receive_from(&self.dlq_name, max_wait, false).await
    }

    async fn receive_from(
        &self,
        channel: &str,
        max_wait: Duration,
        redrive: bool,
    ) -> WorkerResult<Option<ReceivedMessage>> {
        self.requeue_expired(channel).await?;

        let mut conn = self.connection_manager.clone();
        loop {
            let popped: Option<(String, String)> =
                conn.brpop(channel, max_wait.as_secs() as f64).await?;
            let Some((_, message_id)) = popped else {
                return Ok(None); // poll window elapsed
            };

            let key = msg_key(channel, &message_id);
            let exists: bool = conn.exists(&key).await?;
            if !exists {
                // Retention expired while the id sat in the pending list.
                warn!("Message {} on {} has no body, dropping", message_id, channel);
                return Ok(None);
            }

            // Main-queue receives count against the redrive budget; the
            // DLQ channel reads the final count without touching it.
            let receive_count: u32 = if redrive {
                conn.hincr(&key, "receive_count", 1).await?
            } else {
                let stored: Option<u32> = conn.hget(&key, "receive_count").await?;
                stored.unwrap_or(0)
            };

            if redrive && receive_count > self.max_receive_count {
                self.route_to_dlq(&message_id, receive_count - 1).await?;
                continue;
            }

            let body: String = conn.hget(&key, "body").await?;
            let lease_deadline = Utc::now().timestamp() + self.visibility.as_secs() as i64;
            conn.zadd::<_, _, _, ()>(inflight_key(channel), &message_id, lease_deadline).await?;

            debug!(
                "Message {} received from {} (receive_count={})",
                message_id, channel, receive_count
            );
            return Ok(Some(ReceivedMessage {
                receipt: Receipt {
                    channel: channel.to_string(),
                    message_id: message_id.clone(),
                    lease_deadline,
                },
                message_id,
                body,
                receive_count,
            }));
        }
    }

    /// Redrive policy: the message hash moves to the companion DLQ channel
    /// and its id joins the DLQ pending list. The worker never sees the
    /// message again on the main queue.
    async fn route_to_dlq(&self, message_id: &str, final_receive_count: u32) -> WorkerResult<()> {
        let mut conn = self.connection_manager.clone();
        let from = msg_key(&self.queue_name, message_id);
        let to = msg_key(&self.dlq_name, message_id);

        if let Err(e) = conn.rename::<_, _, ()>(&from, &to).await {
            warn!("Failed to move message {} to DLQ storage: {}", message_id, e);
            return Ok(());
        }
        // The routing receive itself never reached a worker, so the stored
        // count reverts to the number of actual deliveries.
        conn.hset::<_, _, _, ()>(&to, "receive_count", final_receive_count).await?;
        conn.expire::<_, ()>(&to, self.dlq_retention.as_secs() as i64).await?;
        conn.lpush::<_, _, ()>(&self.dlq_name, message_id).await?;

        warn!(
            "Message {} exceeded max receive count, routed to DLQ {}",
            message_id, self.dlq_name
        );
        Ok(())
    }

    /// Return every message whose visibility lease has expired to the
    /// pending list. The ZREM guard makes each expired id move exactly once
    /// even with competing workers.
    async fn requeue_expired(&self, channel: &str) -> WorkerResult<()> {
        let mut conn = self.connection_manager.clone();
        let now = Utc::now().timestamp();
        let expired: Vec<String> =
            conn.zrangebyscore(inflight_key(channel), "-inf", now).await?;

        for message_id in expired {
            let removed: u32 = conn.zrem(inflight_key(channel), &message_id).await?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(channel, &message_id).await?;
                info!("Lease expired, message {} requeued on {}", message_id, channel);
            }
        }
        Ok(())
    }

    /// Delete a processed message. Guarded by a Lua script so the delete
    /// only lands while this receipt still owns the lease.
    pub async fn delete(&self, receipt: &Receipt) -> WorkerResult<bool> {
        let script = r#"
            local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
            if score == ARGV[2] then
                redis.call('ZREM', KEYS[1], ARGV[1])
                redis.call('DEL', KEYS[2])
                return 1
            else
                return 0
            end
        "#;

        let mut conn = self.connection_manager.clone();
        let result: i32 = redis::Script::new(script)
            .key(inflight_key(&receipt.channel))
            .key(msg_key(&receipt.channel, &receipt.message_id))
            .arg(&receipt.message_id)
            .arg(receipt.lease_deadline.to_string())
            .invoke_async(&mut conn)
            .await?;

        let deleted = result == 1;
        if deleted {
            debug!("Message {} deleted from {}", receipt.message_id, receipt.channel);
        } else {
            warn!(
                "Message {} lease no longer held, delete skipped on {}",
                receipt.message_id, receipt.channel
            );
        }
        Ok(deleted)
    }

    pub async fn queue_depth(&self) -> WorkerResult<u64> {
        let mut conn = self.connection_manager.clone();
        Ok(conn.llen(&self.queue_name).await?)
    }

    pub async fn dlq_depth(&self) -> WorkerResult<u64> {
        let mut conn = self.connection_manager.clone();
        Ok(conn.llen(&self.dlq_name).await?)
    }
}
