//! Store wrapper with scripted failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tessera_core::{Entry, StoreError, StoreKey, StoreResult, StoreValue};
use tessera_store::{KvStore, MemoryStore, StoreEvent};
use tokio::sync::broadcast;

/// A [`MemoryStore`]-backed store that fails on cue.
///
/// Every operation (except `subscribe`) first consumes the front of the
/// scripted failure queue, if any, and bumps the total call counter either
/// way. Tests use the counter to prove an operation never reached the store,
/// and [`publish`](FlakyStore::publish) to inject events the store would not
/// produce on its own.
pub struct FlakyStore<K: StoreKey, V: StoreValue> {
    inner: MemoryStore<K, V>,
    failures: Mutex<VecDeque<StoreError>>,
    calls: AtomicUsize,
}

impl<K: StoreKey, V: StoreValue> FlakyStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// The backing store, for seeding and direct inspection.
    pub fn inner(&self) -> &MemoryStore<K, V> {
        &self.inner
    }

    /// Script the next `times` operations to fail with `error`.
    pub fn fail_with(&self, error: StoreError, times: usize) {
        let mut failures = self.failures.lock().expect("failure queue poisoned");
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    /// Total operations attempted against this store, failed or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inject an event into the store's notification stream.
    pub fn publish(&self, event: StoreEvent<K, V>) {
        self.inner.publish(event);
    }

    fn admit(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().expect("failure queue poisoned");
        match failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<K: StoreKey, V: StoreValue> Default for FlakyStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> KvStore<K, V> for FlakyStore<K, V> {
    async fn get(&self, keys: &[K]) -> StoreResult<Vec<Entry<K, V>>> {
        self.admit()?;
        self.inner.get(keys).await
    }

    async fn get_starting_from(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>> {
        self.admit()?;
        self.inner.get_starting_from(bound, limit).await
    }

    async fn get_ending_at(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>> {
        self.admit()?;
        self.inner.get_ending_at(bound, limit).await
    }

    async fn set(&self, entries: Vec<Entry<K, V>>) -> StoreResult<()> {
        self.admit()?;
        self.inner.set(entries).await
    }

    async fn delete(&self, keys: &[K]) -> StoreResult<()> {
        self.admit()?;
        self.inner.delete(keys).await
    }

    async fn delete_all(&self) -> StoreResult<()> {
        self.admit()?;
        self.inner.delete_all().await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent<K, V>> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_delegate() {
        let store: FlakyStore<u32, String> = FlakyStore::new();
        store.fail_with(StoreError::transport("scripted"), 2);

        assert!(store.get(&[1]).await.is_err());
        assert!(store.get(&[1]).await.is_err());
        assert!(store.get(&[1]).await.is_ok());
        assert_eq!(store.calls(), 3);
    }
}
