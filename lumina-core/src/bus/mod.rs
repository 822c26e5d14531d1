//! Durable message bus abstraction for the background pipeline.
//!
//! Delivery is at-least-once: a received message stays on a per-queue
//! processing list until acknowledged, and unacknowledged or rejected
//! messages are routed to the dead-letter queue. Handlers must therefore be
//! idempotent.

pub mod memory;
pub mod redis;
pub mod topology;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;
pub use self::topology::{MessageKind, QueueSpec, DEAD_LETTER_QUEUE, ROUTES};

/// One published message.
///
/// `delay_ms` and `priority` are advisory hints carried in the envelope;
/// brokers that cannot honor them deliver in plain FIFO order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub priority: Option<u8>,
    pub delay_ms: Option<u64>,
    pub persistent: bool,
}

impl MessageEnvelope {
    pub fn new(kind: MessageKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id: None,
            timestamp: Utc::now(),
            message_type: kind.as_str().to_string(),
            payload,
            priority: None,
            delay_ms: None,
            persistent: true,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis() as u64);
        self
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// A message handed to a consumer, not yet acknowledged.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: MessageEnvelope,
    /// Opaque tag the broker needs to ack or reject this delivery.
    pub tag: String,
}

/// Dead-letter record: the original envelope plus why it ended up here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
    pub envelope: MessageEnvelope,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Declare every queue in the static topology. Idempotent; a queue that
    /// already exists with divergent arguments is accepted as-is with a
    /// warning.
    async fn declare_topology(&self) -> Result<()>;

    /// Publish one message to the queue its kind routes to. Publishing into
    /// a full queue is rejected with a `TransientBroker` error.
    async fn publish(&self, kind: MessageKind, envelope: MessageEnvelope) -> Result<()>;

    /// Publish a batch: every envelope is serialized individually and the
    /// publishes are awaited concurrently. Any individual fault fails the
    /// batch from the caller's perspective.
    async fn publish_batch(
        &self,
        kind: MessageKind,
        envelopes: Vec<MessageEnvelope>,
    ) -> Result<()>;

    /// Block up to `wait` for the next delivery on `queue`. Expired messages
    /// are dead-lettered during retrieval and never handed out.
    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>>;

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()>;

    /// Reject a delivery: route it to the dead-letter queue with a reason.
    async fn reject(&self, queue: &str, delivery: &Delivery, reason: &str) -> Result<()>;

    async fn queue_len(&self, queue: &str) -> Result<u64>;
    async fn dead_letter_len(&self) -> Result<u64>;

    /// Best-effort close; dispose errors are logged, never raised.
    async fn close(&self);
}
