use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::{CoreError, Result};

use super::{Kvs, KvsBatch, KvsCommand};

/// Redis-backed key-value store.
///
/// Holds a [`ConnectionManager`], which multiplexes and reconnects under the
/// hood; each call clones it, so `&self` methods stay cheap and the adapter
/// can live behind an `Arc<dyn Kvs>`.
#[derive(Clone)]
pub struct RedisKvs {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisKvs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvs")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

fn store_err(op: &str, e: redis::RedisError) -> CoreError {
    CoreError::TransientStore(format!("redis {op} failed: {e}"))
}

impl RedisKvs {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| {
            CoreError::TransientStore(format!("failed to create Redis client: {e}"))
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            CoreError::TransientStore(format!("failed to connect to Redis: {e}"))
        })?;

        info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Kvs for RedisKvs {
    async fn is_ready(&self) -> bool {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(|e| store_err("GET", e))
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(|e| store_err("SETEX", e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| store_err("SET", e)),
        }
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(|e| store_err("GET", e))
    }

    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(|e| store_err("SETEX", e)),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| store_err("SET", e)),
        }
    }

    async fn mget_strings(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        // MGET with a single key collapses to a scalar reply; keep the
        // response shape uniform by always going through the command form.
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| store_err("MGET", e))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let removed: u64 = conn.del(key).await.map_err(|e| store_err("DEL", e))?;
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| store_err("ZADD", e))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        let removed: u64 = conn
            .zrem(key, member)
            .await
            .map_err(|e| store_err("ZREM", e))?;
        Ok(removed > 0)
    }

    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        let mut conn = self.conn();
        conn.zrank(key, member)
            .await
            .map_err(|e| store_err("ZRANK", e))
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.zrange(key, start as isize, stop as isize)
            .await
            .map_err(|e| store_err("ZRANGE", e))
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        conn.zcard(key).await.map_err(|e| store_err("ZCARD", e))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, chunk): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .map_err(|e| store_err("SCAN", e))?;
            keys.extend(chunk);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!("SCAN {} matched {} keys", pattern, keys.len());
        Ok(keys)
    }

    async fn dbsize(&self) -> Result<u64> {
        let mut conn = self.conn();
        redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("DBSIZE", e))
    }

    async fn flush_db(&self) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| store_err("FLUSHDB", e))
    }

    async fn apply_batch(&self, batch: KvsBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for command in batch.into_commands() {
            match command {
                KvsCommand::SetString { key, value, ttl } => match ttl {
                    Some(ttl) => {
                        pipe.cmd("SETEX").arg(key).arg(ttl.as_secs()).arg(value);
                    }
                    None => {
                        pipe.cmd("SET").arg(key).arg(value);
                    }
                },
                KvsCommand::SetBytes { key, value, ttl } => match ttl {
                    Some(ttl) => {
                        pipe.cmd("SETEX").arg(key).arg(ttl.as_secs()).arg(value);
                    }
                    None => {
                        pipe.cmd("SET").arg(key).arg(value);
                    }
                },
                KvsCommand::Delete { key } => {
                    pipe.cmd("DEL").arg(key);
                }
                KvsCommand::ZAdd { key, member, score } => {
                    pipe.cmd("ZADD").arg(key).arg(score).arg(member);
                }
                KvsCommand::ZRem { key, member } => {
                    pipe.cmd("ZREM").arg(key).arg(member);
                }
            }
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| store_err("pipeline", e))
    }
}
