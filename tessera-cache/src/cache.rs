//! The observable entry cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tessera_core::{StoreKey, StoreValue};
use tessera_store::KvStore;
use tokio::sync::{oneshot, Notify};

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryRef};
use crate::io;

/// An eventually-consistent, observable front over any [`KvStore`].
///
/// Every public method answers synchronously from locally-known state; the
/// store is only ever touched by one background task. The relaxations that
/// buy this are deliberate:
///
/// - A fetch result overwrites whatever value is present when it is applied.
///   A local write racing an in-flight fetch for the same key loses; this is
///   the accepted "lose a write" window.
/// - An authoritative notification from the store overrides any locally
///   queued fetch or flush for that key.
/// - After the failure budget is exhausted (3 cycle failures by default),
///   background I/O is disabled for the rest of the cache's lifetime: dirty
///   entries are dropped and stale entries never refresh. Consumers never see
///   the failure; entries simply stay as they are.
///
/// The cache tracks every key it was ever asked about and never evicts - it
/// is a full mirror of touched keys, not an LRU.
///
/// Must be constructed inside a tokio runtime; the background task stops when
/// the cache is dropped.
pub struct EntryCache<K: StoreKey, V: StoreValue, S: KvStore<K, V> + 'static> {
    shared: Arc<CacheShared<K, V>>,
    store: Arc<S>,
}

pub(crate) struct CacheShared<K, V> {
    pub(crate) config: CacheConfig,
    pub(crate) state: Mutex<CacheState<K, V>>,
    /// Wakes the background task when work is enqueued (or on shutdown).
    pub(crate) wake: Notify,
}

pub(crate) struct CacheState<K, V> {
    pub(crate) entries: BTreeMap<K, EntryRef<K, V>>,
    pub(crate) fetch_queue: BTreeSet<K>,
    pub(crate) flush_queue: BTreeSet<K>,
    pub(crate) failures: u32,
    pub(crate) disabled: bool,
    pub(crate) closed: bool,
    pub(crate) cycle_running: bool,
    pub(crate) sync_waiters: Vec<oneshot::Sender<()>>,
}

impl<K, V> CacheShared<K, V> {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> CacheState<K, V> {
    /// Release every `sync()` observer. Called whenever the queues reach
    /// simultaneous emptiness, and on disable/shutdown so observers are never
    /// left hanging on I/O that will not happen.
    pub(crate) fn drain_waiters(&mut self) {
        for waiter in self.sync_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

impl<K: StoreKey, V: StoreValue, S: KvStore<K, V> + 'static> EntryCache<K, V, S> {
    /// Wrap `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    /// Wrap `store` with an explicit configuration.
    pub fn with_config(store: S, config: CacheConfig) -> Self {
        let store = Arc::new(store);
        let events = store.subscribe();
        let shared = Arc::new(CacheShared {
            config,
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                fetch_queue: BTreeSet::new(),
                flush_queue: BTreeSet::new(),
                failures: 0,
                disabled: false,
                closed: false,
                cycle_running: false,
                sync_waiters: Vec::new(),
            }),
            wake: Notify::new(),
        });
        tokio::spawn(io::run(Arc::clone(&shared), Arc::clone(&store), events));
        Self { shared, store }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether background I/O has been permanently disabled by repeated
    /// failures. A degraded cache still answers from memory.
    pub fn is_degraded(&self) -> bool {
        self.shared.lock_state().disabled
    }

    /// Entry for `key`, creating a placeholder and scheduling a background
    /// fetch on first sight. Always returns the same handle for the same key.
    pub fn get(&self, key: &K) -> EntryRef<K, V> {
        let mut state = self.shared.lock_state();
        if let Some(entry) = state.entries.get(key) {
            return Arc::clone(entry);
        }
        let entry = CacheEntry::unset(key.clone());
        state.entries.insert(key.clone(), Arc::clone(&entry));
        if !state.disabled {
            state.fetch_queue.insert(key.clone());
            drop(state);
            self.shared.wake.notify_one();
        }
        entry
    }

    /// Entry for `key` only if it is already tracked. Never triggers a fetch.
    pub fn get_if_exists(&self, key: &K) -> Option<EntryRef<K, V>> {
        self.shared.lock_state().entries.get(key).map(Arc::clone)
    }

    /// Set `key` to `value`, observably and immediately, and schedule a
    /// background flush. Cancels any fetch still pending for the key: a
    /// pending write wins over a stale read.
    pub fn set(&self, key: K, value: V) -> EntryRef<K, V> {
        let mut state = self.shared.lock_state();
        let entry = entry_or_create(&mut state, &key);
        entry.store(Some(value));
        state.fetch_queue.remove(&key);
        if !state.disabled {
            state.flush_queue.insert(key);
            drop(state);
            self.shared.wake.notify_one();
        }
        entry
    }

    /// Set `key` to `value` only if the entry is currently unset; otherwise a
    /// no-op returning the tracked entry.
    ///
    /// The current value may not yet be confirmed by the backing store, so
    /// this is inherently racy. The key is enqueued for both fetch and flush:
    /// if the fetch comes back with a real value before the flush is
    /// transmitted, the fetched value overwrites the speculative one and the
    /// flush transmits it instead (fetch-overrides-flush), so a concurrent
    /// real value suppresses the insert unless the flush reached the store
    /// first.
    pub fn maybe_insert(&self, key: K, value: V) -> EntryRef<K, V> {
        let mut state = self.shared.lock_state();
        let entry = entry_or_create(&mut state, &key);
        if !entry.is_set() {
            entry.store(Some(value));
            if !state.disabled {
                state.fetch_queue.insert(key.clone());
                state.flush_queue.insert(key);
                drop(state);
                self.shared.wake.notify_one();
            }
        }
        entry
    }

    /// Resolve once all currently-enqueued fetch/flush work has drained, or
    /// immediately if none is pending (or background I/O is disabled).
    ///
    /// This is a flush-on-shutdown style wait, not a read-consistency fence.
    pub async fn sync(&self) {
        let waiter = {
            let mut state = self.shared.lock_state();
            let idle = state.fetch_queue.is_empty()
                && state.flush_queue.is_empty()
                && !state.cycle_running;
            if state.disabled || state.closed || idle {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.sync_waiters.push(tx);
                Some(rx)
            }
        };
        if let Some(rx) = waiter {
            let _ = rx.await;
        }
    }
}

fn entry_or_create<K: StoreKey, V: StoreValue>(
    state: &mut CacheState<K, V>,
    key: &K,
) -> EntryRef<K, V> {
    if let Some(entry) = state.entries.get(key) {
        return Arc::clone(entry);
    }
    let entry = CacheEntry::unset(key.clone());
    state.entries.insert(key.clone(), Arc::clone(&entry));
    entry
}

impl<K: StoreKey, V: StoreValue, S: KvStore<K, V> + 'static> Drop for EntryCache<K, V, S> {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        state.closed = true;
        state.drain_waiters();
        drop(state);
        self.shared.wake.notify_one();
    }
}
