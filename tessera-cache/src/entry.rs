//! Observable cache entries.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared handle to a tracked cache entry.
///
/// The cache hands out the same handle for the same key for its whole
/// lifetime, so consumers may hold one across calls.
pub type EntryRef<K, V> = Arc<CacheEntry<K, V>>;

/// A mutable value slot with change-notification hooks.
///
/// `None` means the value is unset: either not yet confirmed by the backing
/// store, or known not to exist there. [`value`](CacheEntry::value) reads the
/// current state synchronously; [`watch`](CacheEntry::watch) subscribes to
/// every subsequent change, which is how UI bindings observe the entry.
#[derive(Debug)]
pub struct CacheEntry<K, V> {
    key: K,
    value: watch::Sender<Option<V>>,
}

impl<K, V: Clone> CacheEntry<K, V> {
    pub(crate) fn unset(key: K) -> EntryRef<K, V> {
        let (value, _rx) = watch::channel(None);
        Arc::new(Self { key, value })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Current value, if any.
    pub fn value(&self) -> Option<V> {
        self.value.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Subscribe to value changes.
    pub fn watch(&self) -> watch::Receiver<Option<V>> {
        self.value.subscribe()
    }

    pub(crate) fn store(&self, value: Option<V>) {
        self.value.send_replace(value);
    }
}
