use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CoreError, Result};

use super::{Kvs, KvsBatch, KvsCommand};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Bytes(Vec<u8>),
    ZSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// In-memory store with the same observable semantics as the Redis adapter.
///
/// Used by the integration suites and by development setups without a Redis
/// instance. Ordered sets rank by `(score, member)` with `f64::total_cmp`,
/// matching sorted-set tie-breaking.
#[derive(Debug, Default)]
pub struct MemoryKvs {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvs {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> R,
    ) -> R {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| e.live());
        f(&mut entries)
    }

    fn ranked_members(zset: &HashMap<String, f64>) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> =
            zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }

    fn apply_command(
        entries: &mut HashMap<String, Entry>,
        command: KvsCommand,
    ) -> Result<()> {
        match command {
            KvsCommand::SetString { key, value, ttl } => {
                entries.insert(
                    key,
                    Entry {
                        value: Value::Str(value),
                        expires_at: ttl.map(|t| Instant::now() + t),
                    },
                );
            }
            KvsCommand::SetBytes { key, value, ttl } => {
                entries.insert(
                    key,
                    Entry {
                        value: Value::Bytes(value),
                        expires_at: ttl.map(|t| Instant::now() + t),
                    },
                );
            }
            KvsCommand::Delete { key } => {
                entries.remove(&key);
            }
            KvsCommand::ZAdd { key, member, score } => {
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    value: Value::ZSet(HashMap::new()),
                    expires_at: None,
                });
                match &mut entry.value {
                    Value::ZSet(zset) => {
                        zset.insert(member, score);
                    }
                    _ => {
                        return Err(CoreError::TransientStore(
                            "ZADD against a non-zset key".into(),
                        ))
                    }
                }
            }
            KvsCommand::ZRem { key, member } => {
                if let Some(entry) = entries.get_mut(&key) {
                    if let Value::ZSet(zset) = &mut entry.value {
                        zset.remove(&member);
                        if zset.is_empty() {
                            entries.remove(&key);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Kvs for MemoryKvs {
    async fn is_ready(&self) -> bool {
        true
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.with_live(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(CoreError::TransientStore(
                "GET against a non-string key".into(),
            )),
            None => Ok(None),
        })
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.with_live(|entries| {
            Self::apply_command(
                entries,
                KvsCommand::SetString {
                    key: key.to_string(),
                    value: value.to_string(),
                    ttl,
                },
            )
        })
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_live(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Bytes(b),
                ..
            }) => Ok(Some(b.clone())),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone().into_bytes())),
            Some(_) => Err(CoreError::TransientStore(
                "GET against a non-string key".into(),
            )),
            None => Ok(None),
        })
    }

    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.with_live(|entries| {
            Self::apply_command(
                entries,
                KvsCommand::SetBytes {
                    key: key.to_string(),
                    value: value.to_vec(),
                    ttl,
                },
            )
        })
    }

    async fn mget_strings(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.with_live(|entries| {
            Ok(keys
                .iter()
                .map(|key| match entries.get(key) {
                    Some(Entry {
                        value: Value::Str(s),
                        ..
                    }) => Some(s.clone()),
                    _ => None,
                })
                .collect())
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.with_live(|entries| Ok(entries.remove(key).is_some()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.with_live(|entries| {
            Self::apply_command(
                entries,
                KvsCommand::ZAdd {
                    key: key.to_string(),
                    member: member.to_string(),
                    score,
                },
            )
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        self.with_live(|entries| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let Value::ZSet(zset) = &mut entry.value else {
                return Ok(false);
            };
            let removed = zset.remove(member).is_some();
            if zset.is_empty() {
                entries.remove(key);
            }
            Ok(removed)
        })
    }

    async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        self.with_live(|entries| {
            let Some(Entry {
                value: Value::ZSet(zset),
                ..
            }) = entries.get(key)
            else {
                return Ok(None);
            };
            Ok(Self::ranked_members(zset)
                .iter()
                .position(|(m, _)| m == member)
                .map(|rank| rank as u64))
        })
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.with_live(|entries| {
            let Some(Entry {
                value: Value::ZSet(zset),
                ..
            }) = entries.get(key)
            else {
                return Ok(Vec::new());
            };
            let members = Self::ranked_members(zset);
            let len = members.len() as i64;
            let norm = |idx: i64| -> i64 {
                if idx < 0 {
                    (len + idx).max(0)
                } else {
                    idx
                }
            };
            let start = norm(start);
            let stop = norm(stop).min(len - 1);
            if start > stop || start >= len {
                return Ok(Vec::new());
            }
            Ok(members[start as usize..=stop as usize]
                .iter()
                .map(|(m, _)| m.clone())
                .collect())
        })
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        self.with_live(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::ZSet(zset),
                ..
            }) => Ok(zset.len() as u64),
            _ => Ok(0),
        })
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_live(|entries| {
            Ok(entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    async fn dbsize(&self) -> Result<u64> {
        self.with_live(|entries| Ok(entries.len() as u64))
    }

    async fn flush_db(&self) -> Result<()> {
        self.with_live(|entries| {
            entries.clear();
            Ok(())
        })
    }

    async fn apply_batch(&self, batch: KvsBatch) -> Result<()> {
        self.with_live(|entries| {
            for command in batch.into_commands() {
                Self::apply_command(entries, command)?;
            }
            Ok(())
        })
    }
}
