use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use parking_lot::Mutex;
use tracing::warn;

use crate::config::BusConfig;
use crate::error::{CoreError, Result};

use super::topology::{MessageKind, ROUTES};
use super::{DeadLetter, Delivery, MessageBus, MessageEnvelope};

#[derive(Debug, Default)]
struct BusState {
    queues: HashMap<String, VecDeque<String>>,
    processing: HashMap<String, Vec<String>>,
    dead_letters: Vec<DeadLetter>,
    declared: HashMap<&'static str, (u64, u64)>,
}

/// In-process bus with the same observable contract as the Redis adapter:
/// bounded queues with publish rejection, TTL expiry at delivery, processing
/// lists for at-least-once semantics, and a dead-letter queue.
#[derive(Debug, Default)]
pub struct MemoryBus {
    state: Mutex<BusState>,
    config: BusConfig,
}

impl MemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            config,
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    fn publish_raw(&self, queue: &str, raw: String) -> Result<()> {
        let mut state = self.state.lock();
        let entries = state.queues.entry(queue.to_string()).or_default();
        if entries.len() as u64 >= self.config.max_queue_length {
            return Err(CoreError::TransientBroker(format!(
                "queue {queue} is full ({} messages), publish rejected",
                entries.len()
            )));
        }
        entries.push_back(raw);
        Ok(())
    }

    fn try_take(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.lock();
        let Some(raw) = state
            .queues
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };

        let envelope: MessageEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(queue, "Dropping unparseable message: {}", e);
                return Ok(None);
            }
        };

        let ttl = Duration::from_secs(self.config.message_ttl_secs);
        if envelope.age(Utc::now()) > ttl {
            state.dead_letters.push(DeadLetter {
                reason: "expired".into(),
                dead_lettered_at: Utc::now(),
                envelope,
            });
            return Ok(None);
        }

        state
            .processing
            .entry(queue.to_string())
            .or_default()
            .push(raw.clone());
        Ok(Some(Delivery { envelope, tag: raw }))
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn declare_topology(&self) -> Result<()> {
        let mut state = self.state.lock();
        let args = (self.config.message_ttl_secs, self.config.max_queue_length);
        for spec in ROUTES {
            match state.declared.get(spec.queue) {
                Some(existing) if *existing != args => {
                    warn!(
                        queue = spec.queue,
                        "Queue already declared with divergent arguments, keeping existing declaration"
                    );
                }
                _ => {
                    state.declared.insert(spec.queue, args);
                }
            }
            state.queues.entry(spec.queue.to_string()).or_default();
        }
        Ok(())
    }

    async fn publish(&self, kind: MessageKind, envelope: MessageEnvelope) -> Result<()> {
        let raw = serde_json::to_string(&envelope)?;
        self.publish_raw(kind.route().queue, raw)
    }

    async fn publish_batch(
        &self,
        kind: MessageKind,
        envelopes: Vec<MessageEnvelope>,
    ) -> Result<()> {
        let queue = kind.route().queue;
        let raws = envelopes
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        try_join_all(
            raws.into_iter()
                .map(|raw| async move { self.publish_raw(queue, raw) }),
        )
        .await?;
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_take(queue)? {
                return Ok(Some(delivery));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(pending) = state.processing.get_mut(queue) {
            pending.retain(|raw| raw != &delivery.tag);
        }
        Ok(())
    }

    async fn reject(&self, queue: &str, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(pending) = state.processing.get_mut(queue) {
            pending.retain(|raw| raw != &delivery.tag);
        }
        state.dead_letters.push(DeadLetter {
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
            envelope: delivery.envelope.clone(),
        });
        Ok(())
    }

    async fn queue_len(&self, queue: &str) -> Result<u64> {
        let state = self.state.lock();
        Ok(state.queues.get(queue).map_or(0, VecDeque::len) as u64)
    }

    async fn dead_letter_len(&self) -> Result<u64> {
        Ok(self.state.lock().dead_letters.len() as u64)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bus() -> MemoryBus {
        MemoryBus::new(BusConfig {
            message_ttl_secs: 60,
            max_queue_length: 2,
            consumer_block_secs: 1,
        })
    }

    #[tokio::test]
    async fn publish_receive_ack_round_trip() {
        let bus = bus();
        bus.declare_topology().await.unwrap();

        let envelope = MessageEnvelope::new(
            MessageKind::CollectionScan,
            json!({"jobId": "x"}),
        );
        bus.publish(MessageKind::CollectionScan, envelope.clone())
            .await
            .unwrap();

        let queue = MessageKind::CollectionScan.route().queue;
        let delivery = bus
            .receive(queue, Duration::from_millis(50))
            .await
            .unwrap()
            .expect("delivery");
        assert_eq!(delivery.envelope.id, envelope.id);
        assert_eq!(delivery.envelope.message_type, "collectionScan");

        bus.ack(queue, &delivery).await.unwrap();
        assert_eq!(bus.queue_len(queue).await.unwrap(), 0);
        assert_eq!(bus.dead_letter_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn full_queue_rejects_publish() {
        let bus = bus();
        for _ in 0..2 {
            bus.publish(
                MessageKind::BulkOperation,
                MessageEnvelope::new(MessageKind::BulkOperation, json!({})),
            )
            .await
            .unwrap();
        }
        let err = bus
            .publish(
                MessageKind::BulkOperation,
                MessageEnvelope::new(MessageKind::BulkOperation, json!({})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransientBroker(_)));
    }

    #[tokio::test]
    async fn expired_messages_are_dead_lettered() {
        let bus = MemoryBus::new(BusConfig {
            message_ttl_secs: 0,
            max_queue_length: 10,
            consumer_block_secs: 1,
        });
        let mut envelope =
            MessageEnvelope::new(MessageKind::CollectionScan, json!({}));
        envelope.timestamp = Utc::now() - chrono::Duration::seconds(30);
        bus.publish(MessageKind::CollectionScan, envelope)
            .await
            .unwrap();

        let queue = MessageKind::CollectionScan.route().queue;
        let delivery = bus.receive(queue, Duration::from_millis(10)).await.unwrap();
        assert!(delivery.is_none());
        assert_eq!(bus.dead_letter_len().await.unwrap(), 1);
        assert_eq!(bus.dead_letters()[0].reason, "expired");
    }

    #[tokio::test]
    async fn reject_routes_to_dead_letters() {
        let bus = bus();
        bus.publish(
            MessageKind::ThumbnailGeneration,
            MessageEnvelope::new(MessageKind::ThumbnailGeneration, json!({})),
        )
        .await
        .unwrap();

        let queue = MessageKind::ThumbnailGeneration.route().queue;
        let delivery = bus
            .receive(queue, Duration::from_millis(50))
            .await
            .unwrap()
            .expect("delivery");
        bus.reject(queue, &delivery, "handler failed").await.unwrap();

        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "handler failed");
    }
}
