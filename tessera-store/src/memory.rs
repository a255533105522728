//! In-memory store implementation.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tessera_core::{Entry, StoreError, StoreKey, StoreResult, StoreValue};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{KvStore, StoreEvent, DEFAULT_EVENT_CAPACITY};

/// In-process implementation of the store contract.
///
/// Backs the table with an ordered map behind an `RwLock`. Cloned handles
/// share the same table and event channel, so a mutation through one handle
/// is observed by subscribers of every other - the same visibility rule a
/// remote service gives independent clients.
///
/// Serves as the reference implementation and as the service side in tests;
/// it is not durable.
pub struct MemoryStore<K, V> {
    inner: Arc<MemoryInner<K, V>>,
}

struct MemoryInner<K, V> {
    table: RwLock<BTreeMap<K, V>>,
    events: broadcast::Sender<StoreEvent<K, V>>,
}

impl<K: StoreKey, V: StoreValue> MemoryStore<K, V> {
    /// Create an empty store with the default event capacity.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty store with an explicit event channel capacity.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _rx) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(MemoryInner {
                table: RwLock::new(BTreeMap::new()),
                events,
            }),
        }
    }

    /// Number of entries currently in the table.
    pub fn len(&self) -> usize {
        self.inner.table.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish an event to every subscriber of this store.
    ///
    /// Mutating operations publish their own `Set`/`Delete` events; this hook
    /// exists for embedders that learn about changes out of band (and for
    /// tests injecting `SyncLost`).
    pub fn publish(&self, event: StoreEvent<K, V>) {
        let kind = event.kind();
        match self.inner.events.send(event) {
            Ok(receivers) => {
                debug!(kind, receivers, "published store event");
            }
            Err(_) => {
                // No subscribers - nothing to deliver.
                debug!(kind, "no subscribers for store event");
            }
        }
    }
}

impl<K: StoreKey, V: StoreValue> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for MemoryStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> KvStore<K, V> for MemoryStore<K, V> {
    async fn get(&self, keys: &[K]) -> StoreResult<Vec<Entry<K, V>>> {
        let table = self.inner.table.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(keys
            .iter()
            .filter_map(|k| {
                table
                    .get(k)
                    .map(|v| Entry::new(k.clone(), v.clone()))
            })
            .collect())
    }

    async fn get_starting_from(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>> {
        let table = self.inner.table.read().map_err(|_| StoreError::LockPoisoned)?;
        let lower = match bound {
            Some(b) => Bound::Included(b),
            None => Bound::Unbounded,
        };
        Ok(table
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| Entry::new(k.clone(), v.clone()))
            .collect())
    }

    async fn get_ending_at(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>> {
        let table = self.inner.table.read().map_err(|_| StoreError::LockPoisoned)?;
        let upper = match bound {
            Some(b) => Bound::Included(b),
            None => Bound::Unbounded,
        };
        Ok(table
            .range((Bound::Unbounded, upper))
            .rev()
            .take(limit)
            .map(|(k, v)| Entry::new(k.clone(), v.clone()))
            .collect())
    }

    async fn set(&self, entries: Vec<Entry<K, V>>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        {
            let mut table = self.inner.table.write().map_err(|_| StoreError::LockPoisoned)?;
            for entry in &entries {
                table.insert(entry.key.clone(), entry.value.clone());
            }
        }
        self.publish(StoreEvent::Set(entries));
        Ok(())
    }

    async fn delete(&self, keys: &[K]) -> StoreResult<()> {
        let removed: Vec<K> = {
            let mut table = self.inner.table.write().map_err(|_| StoreError::LockPoisoned)?;
            keys.iter()
                .filter(|k| table.remove(k).is_some())
                .cloned()
                .collect()
        };
        // Only keys that were actually present constitute a visible removal.
        if !removed.is_empty() {
            self.publish(StoreEvent::Delete(removed));
        }
        Ok(())
    }

    async fn delete_all(&self) -> StoreResult<()> {
        let removed: Vec<K> = {
            let mut table = self.inner.table.write().map_err(|_| StoreError::LockPoisoned)?;
            let keys = table.keys().cloned().collect();
            table.clear();
            keys
        };
        if !removed.is_empty() {
            self.publish(StoreEvent::Delete(removed));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent<K, V>> {
        self.inner.events.subscribe()
    }
}
