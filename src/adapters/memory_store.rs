//! In-process key-value store.
//!
//! Backs the [`KvStore`] port with an `scc::HashMap`. Expiry is lazy: an expired
//! slot is treated as absent on access and dropped when it is next touched or
//! when [`MemoryStore::purge_expired`] runs. Every single-key operation runs
//! under the map's entry lock, which gives `incr_by` and `push_bounded` the
//! atomicity the port requires.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scc::{HashMap, hash_map::Entry};

use crate::{
    core::bounded_log::BoundedLog,
    ports::kv_store::{KvStore, StoreError, StoreResult},
};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Counter(i64),
    List(BoundedLog<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Memory-backed [`KvStore`] for single-node deployments and tests
#[derive(Default)]
pub struct MemoryStore {
    slots: HashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired slot. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots
            .retain_async(|_, slot| !slot.is_expired(now))
            .await;
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired store entries");
        }
        removed
    }

    fn wrong_type(key: &str, expected: &str) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            message: format!("value is not a {expected}"),
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let found = self
            .slots
            .read_async(key, |_, slot| {
                if slot.is_expired(now) {
                    return Ok(None);
                }
                match &slot.value {
                    StoredValue::Text(text) => Ok(Some(text.clone())),
                    StoredValue::Counter(n) => Ok(Some(n.to_string())),
                    StoredValue::List(_) => Err(()),
                }
            })
            .await;

        match found {
            Some(Ok(value)) => Ok(value),
            Some(Err(())) => Err(Self::wrong_type(key, "string")),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let slot = Slot::new(StoredValue::Text(value.to_string()), ttl);
        match self.slots.entry_async(key.to_string()).await {
            Entry::Occupied(mut occupied) => {
                *occupied.get_mut() = slot;
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(slot);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.slots.remove_async(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .slots
            .read_async(key, |_, slot| !slot.is_expired(now))
            .await
            .unwrap_or(false))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let now = Instant::now();
        match self.slots.entry_async(key.to_string()).await {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.is_expired(now) {
                    *slot = Slot::new(StoredValue::Counter(delta), None);
                    return Ok(delta);
                }

                let current = match &slot.value {
                    StoredValue::Counter(n) => *n,
                    StoredValue::Text(text) => text
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| Self::wrong_type(key, "integer"))?,
                    StoredValue::List(_) => return Err(Self::wrong_type(key, "integer")),
                };
                let next = current.saturating_add(delta);
                slot.value = StoredValue::Counter(next);
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(Slot::new(StoredValue::Counter(delta), None));
                Ok(delta)
            }
        }
    }

    async fn push_bounded(&self, key: &str, value: &str, capacity: usize) -> StoreResult<()> {
        let now = Instant::now();
        match self.slots.entry_async(key.to_string()).await {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.is_expired(now) {
                    let mut log = BoundedLog::new(capacity);
                    log.push(value.to_string());
                    *slot = Slot::new(StoredValue::List(log), None);
                    return Ok(());
                }

                match &mut slot.value {
                    StoredValue::List(log) => {
                        if log.capacity() != capacity {
                            log.set_capacity(capacity);
                        }
                        log.push(value.to_string());
                        Ok(())
                    }
                    _ => Err(Self::wrong_type(key, "list")),
                }
            }
            Entry::Vacant(vacant) => {
                let mut log = BoundedLog::new(capacity);
                log.push(value.to_string());
                vacant.insert_entry(Slot::new(StoredValue::List(log), None));
                Ok(())
            }
        }
    }

    async fn list(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let found = self
            .slots
            .read_async(key, |_, slot| {
                if slot.is_expired(now) {
                    return Ok(Vec::new());
                }
                match &slot.value {
                    StoredValue::List(log) => Ok(log.iter().take(limit).cloned().collect()),
                    _ => Err(()),
                }
            })
            .await;

        match found {
            Some(Ok(entries)) => Ok(entries),
            Some(Err(())) => Err(Self::wrong_type(key, "list")),
            None => Ok(Vec::new()),
        }
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
