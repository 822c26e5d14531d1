use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::error::{CoreError, Result};

use super::topology::{MessageKind, DEAD_LETTER_QUEUE, ROUTES};
use super::{DeadLetter, Delivery, MessageBus, MessageEnvelope};

fn broker_err(op: &str, e: redis::RedisError) -> CoreError {
    CoreError::TransientBroker(format!("broker {op} failed: {e}"))
}

fn processing_list(queue: &str) -> String {
    format!("{queue}:processing")
}

fn meta_key(queue: &str) -> String {
    format!("queue_meta:{queue}")
}

/// Redis-backed bus using the reliable-queue list pattern.
///
/// Publishes `LPUSH` onto the queue list; consumers `BLMOVE` the tail onto a
/// per-queue processing list, which keeps unacknowledged messages durable
/// across consumer crashes. `ack` removes the entry from the processing
/// list; `reject` moves it to the dead-letter list instead.
///
/// The connection is opened lazily on first use and guarded by a mutex so a
/// single code path creates or re-creates it.
pub struct RedisBus {
    client: redis::Client,
    conn: Mutex<Option<ConnectionManager>>,
    config: BusConfig,
    declared: RwLock<HashMap<&'static str, (u64, u64)>>,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("declared", &self.declared.read().len())
            .finish()
    }
}

impl RedisBus {
    pub fn new(redis_url: &str, config: BusConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            CoreError::TransientBroker(format!("failed to create broker client: {e}"))
        })?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            config,
            declared: RwLock::new(HashMap::new()),
        })
    }

    /// Current connection, creating or re-creating it if absent or dead.
    async fn connection(&self) -> Result<ConnectionManager> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            let mut probe = conn.clone();
            match redis::cmd("PING").query_async::<String>(&mut probe).await {
                Ok(_) => return Ok(conn.clone()),
                Err(e) => {
                    warn!("Broker connection unusable, re-creating: {}", e);
                    *guard = None;
                }
            }
        }

        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| {
                CoreError::TransientBroker(format!("failed to connect to broker: {e}"))
            })?;
        *guard = Some(conn.clone());
        info!("Broker connection established");
        Ok(conn)
    }

    async fn publish_raw(&self, queue: &str, raw: String) -> Result<()> {
        let mut conn = self.connection().await?;

        let len: u64 = redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_err("LLEN", e))?;
        if len >= self.config.max_queue_length {
            return Err(CoreError::TransientBroker(format!(
                "queue {queue} is full ({len} messages), publish rejected"
            )));
        }

        redis::cmd("LPUSH")
            .arg(queue)
            .arg(&raw)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| broker_err("LPUSH", e))
    }

    async fn dead_letter_raw(
        &self,
        conn: &mut ConnectionManager,
        envelope: MessageEnvelope,
        reason: &str,
    ) -> Result<()> {
        let record = DeadLetter {
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
            envelope,
        };
        let raw = serde_json::to_string(&record)?;
        redis::cmd("LPUSH")
            .arg(DEAD_LETTER_QUEUE)
            .arg(raw)
            .query_async::<()>(conn)
            .await
            .map_err(|e| broker_err("LPUSH", e))
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn declare_topology(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let args = (self.config.message_ttl_secs, self.config.max_queue_length);

        for spec in ROUTES {
            if self.declared.read().contains_key(spec.queue) {
                continue;
            }
            let existing: HashMap<String, u64> = redis::cmd("HGETALL")
                .arg(meta_key(spec.queue))
                .query_async(&mut conn)
                .await
                .map_err(|e| broker_err("HGETALL", e))?;

            if !existing.is_empty() {
                let divergent = existing.get("message_ttl_secs") != Some(&args.0)
                    || existing.get("max_length") != Some(&args.1);
                if divergent {
                    warn!(
                        queue = spec.queue,
                        "Queue already declared with divergent arguments, keeping existing declaration"
                    );
                }
                self.declared.write().insert(spec.queue, args);
                continue;
            }

            redis::cmd("HSET")
                .arg(meta_key(spec.queue))
                .arg("routing_key")
                .arg(spec.routing_key)
                .arg("message_ttl_secs")
                .arg(args.0)
                .arg("max_length")
                .arg(args.1)
                .arg("dead_letter")
                .arg(DEAD_LETTER_QUEUE)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| broker_err("HSET", e))?;
            self.declared.write().insert(spec.queue, args);
            debug!(queue = spec.queue, routing_key = spec.routing_key, "Declared queue");
        }
        Ok(())
    }

    async fn publish(&self, kind: MessageKind, envelope: MessageEnvelope) -> Result<()> {
        let spec = kind.route();
        let raw = serde_json::to_string(&envelope)?;
        self.publish_raw(spec.queue, raw).await
    }

    async fn publish_batch(
        &self,
        kind: MessageKind,
        envelopes: Vec<MessageEnvelope>,
    ) -> Result<()> {
        let spec = kind.route();
        let raws = envelopes
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        try_join_all(raws.into_iter().map(|raw| self.publish_raw(spec.queue, raw)))
            .await?;
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("BLMOVE")
            .arg(queue)
            .arg(processing_list(queue))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_err("BLMOVE", e))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope: MessageEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(queue, "Dropping unparseable message to dead letters: {}", e);
                redis::cmd("LPUSH")
                    .arg(DEAD_LETTER_QUEUE)
                    .arg(&raw)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| broker_err("LPUSH", e))?;
                redis::cmd("LREM")
                    .arg(processing_list(queue))
                    .arg(1)
                    .arg(&raw)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| broker_err("LREM", e))?;
                return Ok(None);
            }
        };

        let ttl = Duration::from_secs(self.config.message_ttl_secs);
        if envelope.age(Utc::now()) > ttl {
            debug!(queue, id = %envelope.id, "Message expired in queue, dead-lettering");
            self.dead_letter_raw(&mut conn, envelope, "expired").await?;
            redis::cmd("LREM")
                .arg(processing_list(queue))
                .arg(1)
                .arg(&raw)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| broker_err("LREM", e))?;
            return Ok(None);
        }

        Ok(Some(Delivery { envelope, tag: raw }))
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("LREM")
            .arg(processing_list(queue))
            .arg(1)
            .arg(&delivery.tag)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| broker_err("LREM", e))
    }

    async fn reject(&self, queue: &str, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        self.dead_letter_raw(&mut conn, delivery.envelope.clone(), reason)
            .await?;
        redis::cmd("LREM")
            .arg(processing_list(queue))
            .arg(1)
            .arg(&delivery.tag)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| broker_err("LREM", e))
    }

    async fn queue_len(&self, queue: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_err("LLEN", e))
    }

    async fn dead_letter_len(&self) -> Result<u64> {
        self.queue_len(DEAD_LETTER_QUEUE).await
    }

    async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if guard.take().is_some() {
            info!("Broker connection closed");
        }
    }
}
