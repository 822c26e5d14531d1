//! Key-value store abstraction.
//!
//! Everything the index engine keeps here is derived from the primary
//! collection store and safe to flush; losing KVS data costs performance,
//! never correctness.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryKvs;
pub use self::redis::RedisKvs;

/// A single queued command inside a [`KvsBatch`].
#[derive(Debug, Clone)]
pub enum KvsCommand {
    SetString {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    SetBytes {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    Delete {
        key: String,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
}

/// Pending commands collected for one submission.
///
/// The batch is a plain builder: commands are enqueued locally and flushed in
/// one [`Kvs::apply_batch`] call. Implementations may pipeline or use a
/// native multi-command primitive; observable ordering must equal issuing the
/// commands one by one.
#[derive(Debug, Default)]
pub struct KvsBatch {
    commands: Vec<KvsCommand>,
}

impl KvsBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> &mut Self {
        self.commands.push(KvsCommand::SetString {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn set_bytes(
        &mut self,
        key: impl Into<String>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> &mut Self {
        self.commands.push(KvsCommand::SetBytes {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(KvsCommand::Delete { key: key.into() });
        self
    }

    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.commands.push(KvsCommand::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    pub fn zrem(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
    ) -> &mut Self {
        self.commands.push(KvsCommand::ZRem {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn into_commands(self) -> Vec<KvsCommand> {
        self.commands
    }
}

/// Fast in-memory store port.
///
/// Ordered-set semantics follow the usual sorted-set contract: members are
/// ranked by score, ties broken by lexical member order, and ZADD of an
/// existing member updates its score in place. Single ZADD calls are atomic;
/// there is no cross-key transaction.
#[async_trait]
pub trait Kvs: Send + Sync {
    async fn is_ready(&self) -> bool;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()>;

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Multi-get; the result is positionally aligned with `keys`.
    async fn mget_strings(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool>;
    /// 0-based rank of `member` in ascending score order.
    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>>;
    /// Members by rank range, inclusive; negative indices count from the end.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// All keys matching `prefix*`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn dbsize(&self) -> Result<u64>;
    async fn flush_db(&self) -> Result<()>;

    /// Submit a batch of commands. Ordering within the batch is preserved.
    async fn apply_batch(&self, batch: KvsBatch) -> Result<()>;
}
