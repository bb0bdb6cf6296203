//! Redis-based delivery queue with visibility timeouts.
//!
//! The queue carries job-dispatch notices with at-least-once semantics:
//!
//! - `send` enqueues a notice and returns its message id
//! - `read` hands out up to N notices and hides each for a visibility
//!   window
//! - `delete` acknowledges a notice permanently
//!
//! # Queue Structure
//!
//! Two Redis keys per queue:
//!
//! - `{queue_name}`: list of visible notices, LPUSH/RPOP in FIFO order
//! - `{queue_name}:inflight`: sorted set of read-but-unacknowledged
//!   envelopes, scored by the epoch millisecond at which they become
//!   visible again
//!
//! A notice that is read but never deleted reappears once its score
//! passes; consumers must tolerate duplicate delivery of the same job.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::notice::{DeliveryNotice, NoticeEnvelope, ReceivedNotice};

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize notice data.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// At-least-once channel for job-dispatch notices.
///
/// No ordering guarantee is provided across notices.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Enqueues a notice; returns the assigned message id.
    async fn send(&self, notice: DeliveryNotice) -> Result<Uuid, QueueError>;

    /// Returns up to `max_messages` currently-visible notices, hiding each
    /// from other readers for `visibility_timeout`.
    async fn read(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedNotice>, QueueError>;

    /// Permanently removes a notice; returns whether one matched.
    async fn delete(&self, msg_id: Uuid) -> Result<bool, QueueError>;
}

/// Redis implementation of [`DeliveryQueue`].
pub struct RedisDeliveryQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Name of the visible-notice list.
    queue_name: String,
    /// Key of the in-flight sorted set.
    inflight_key: String,
}

impl RedisDeliveryQueue {
    /// Connects to Redis and creates a new delivery queue.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a queue from an existing ConnectionManager.
    ///
    /// Useful when sharing a connection pool across multiple components.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            inflight_key: format!("{}:inflight", queue_name),
        }
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Returns the number of currently-visible notices.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    /// Returns the number of read-but-unacknowledged notices.
    pub async fn inflight_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.zcard(&self.inflight_key).await?;
        Ok(len)
    }

    /// Returns whether no notices are visible.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Moves envelopes whose visibility deadline has passed back to the
    /// visible list.
    async fn reclaim_expired(&self, now_ms: i64) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();

        let expired: Vec<String> = conn.zrangebyscore(&self.inflight_key, 0i64, now_ms).await?;

        for entry in &expired {
            // Atomically unpark and requeue so a crash between the two
            // steps cannot drop the notice.
            let mut pipe = redis::pipe();
            pipe.atomic()
                .zrem(&self.inflight_key, entry)
                .rpush(&self.queue_name, entry);
            pipe.query_async::<_, ()>(&mut conn).await?;
        }

        Ok(expired.len())
    }
}

#[async_trait]
impl DeliveryQueue for RedisDeliveryQueue {
    async fn send(&self, notice: DeliveryNotice) -> Result<Uuid, QueueError> {
        let envelope = NoticeEnvelope::wrap(notice);
        let msg_id = envelope.msg_id;
        let serialized = serde_json::to_string(&envelope)?;

        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;

        Ok(msg_id)
    }

    async fn read(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedNotice>, QueueError> {
        let mut conn = self.redis.clone();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let reclaimed = self.reclaim_expired(now_ms).await?;
        if reclaimed > 0 {
            warn!(
                queue = %self.queue_name,
                reclaimed = reclaimed,
                "Redelivering notices whose visibility timeout expired"
            );
        }

        let deadline_ms = now_ms + visibility_timeout.as_millis() as i64;
        let mut received = Vec::new();

        for _ in 0..max_messages {
            let data: Option<String> = conn.rpop(&self.queue_name, None).await?;
            let Some(data) = data else { break };

            // Park first so the notice survives a consumer crash between
            // pop and processing.
            conn.zadd::<_, _, _, ()>(&self.inflight_key, &data, deadline_ms)
                .await?;

            match serde_json::from_str::<NoticeEnvelope>(&data) {
                Ok(envelope) => received.push(envelope.into_received()),
                Err(e) => {
                    // A payload no build can parse would otherwise cycle
                    // through redelivery forever.
                    warn!(queue = %self.queue_name, error = %e, "Dropping unparseable notice");
                    conn.zrem::<_, _, ()>(&self.inflight_key, &data).await?;
                }
            }
        }

        Ok(received)
    }

    async fn delete(&self, msg_id: Uuid) -> Result<bool, QueueError> {
        let mut conn = self.redis.clone();

        // In-flight first: acknowledgments normally arrive while the
        // notice is parked.
        let inflight: Vec<String> = conn.zrange(&self.inflight_key, 0, -1).await?;
        for entry in inflight {
            if let Ok(envelope) = serde_json::from_str::<NoticeEnvelope>(&entry) {
                if envelope.msg_id == msg_id {
                    conn.zrem::<_, _, ()>(&self.inflight_key, &entry).await?;
                    return Ok(true);
                }
            }
        }

        // A notice may also be deleted before any reader picked it up.
        let visible: Vec<String> = conn.lrange(&self.queue_name, 0, -1).await?;
        for entry in visible {
            if let Ok(envelope) = serde_json::from_str::<NoticeEnvelope>(&entry) {
                if envelope.msg_id == msg_id {
                    conn.lrem::<_, _, ()>(&self.queue_name, 1, &entry).await?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}
