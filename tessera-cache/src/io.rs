//! Background I/O task: batched fetch/flush plus live reconciliation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_core::{Entry, StoreError, StoreKey, StoreValue};
use tessera_store::{KvStore, StoreEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, error, warn};

use crate::cache::CacheShared;

/// Task body. One instance per cache; the only code that ever suspends, and
/// it suspends only at batched store calls.
pub(crate) async fn run<K, V, S>(
    shared: Arc<CacheShared<K, V>>,
    store: Arc<S>,
    mut events: broadcast::Receiver<StoreEvent<K, V>>,
) where
    K: StoreKey,
    V: StoreValue,
    S: KvStore<K, V> + 'static,
{
    let mut events_open = true;
    loop {
        if events_open {
            // Notifications take priority over starting a cycle: an
            // authoritative change must not lose to local queued work that
            // happens to be ready at the same moment.
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => reconcile(&shared, event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change stream lagged; treating as sync loss");
                        reconcile(&shared, StoreEvent::SyncLost);
                    }
                    Err(RecvError::Closed) => {
                        debug!("change stream closed");
                        events_open = false;
                    }
                },
                _ = shared.wake.notified() => {}
            }
        } else {
            shared.wake.notified().await;
        }

        {
            let mut state = shared.lock_state();
            if state.closed {
                state.drain_waiters();
                return;
            }
        }

        run_cycle(&shared, store.as_ref(), &mut events, &mut events_open).await;
    }
}

enum Step<K, V> {
    Fetch(Vec<K>),
    Flush(Vec<K>, Vec<Entry<K, V>>),
    Idle,
}

enum Requeue<K> {
    Fetch(Vec<K>),
    Flush(Vec<K>),
}

/// Drain both queues, fetches before flushes, until they are empty at the
/// same instant. Work enqueued during a batch is picked up by a later
/// iteration, never the current one, so overlapping writes and reconnects
/// converge instead of racing indefinitely.
async fn run_cycle<K, V, S>(
    shared: &Arc<CacheShared<K, V>>,
    store: &S,
    events: &mut broadcast::Receiver<StoreEvent<K, V>>,
    events_open: &mut bool,
) where
    K: StoreKey,
    V: StoreValue,
    S: KvStore<K, V>,
{
    loop {
        drain_pending_events(shared, events, events_open);

        match next_step(shared) {
            Step::Idle => return,
            Step::Fetch(keys) => match store.get(&keys).await {
                Ok(entries) => apply_fetch(shared, &keys, entries),
                Err(err) => {
                    if record_failure(shared, Requeue::Fetch(keys), err) {
                        return;
                    }
                }
            },
            Step::Flush(keys, entries) => {
                // Every candidate may have been unset between enqueue and
                // snapshot (a delete notification won); nothing to transmit.
                if entries.is_empty() {
                    continue;
                }
                match store.set(entries).await {
                    Ok(()) => {}
                    Err(err) => {
                        if record_failure(shared, Requeue::Flush(keys), err) {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn next_step<K: StoreKey, V: StoreValue>(shared: &CacheShared<K, V>) -> Step<K, V> {
    let mut guard = shared.lock_state();
    let state = &mut *guard;
    if state.closed || state.disabled {
        state.cycle_running = false;
        state.drain_waiters();
        return Step::Idle;
    }
    if !state.fetch_queue.is_empty() {
        state.cycle_running = true;
        let keys: Vec<K> = state
            .fetch_queue
            .iter()
            .take(shared.config.batch_size)
            .cloned()
            .collect();
        for key in &keys {
            state.fetch_queue.remove(key);
        }
        return Step::Fetch(keys);
    }
    if !state.flush_queue.is_empty() {
        state.cycle_running = true;
        let keys: Vec<K> = state
            .flush_queue
            .iter()
            .take(shared.config.batch_size)
            .cloned()
            .collect();
        for key in &keys {
            state.flush_queue.remove(key);
        }
        // Flatten to plain entries at transmission time. Snapshotting the
        // entry's *current* value is what makes an already-applied fetch
        // result override a speculative insert still queued behind it.
        let entries: Vec<Entry<K, V>> = keys
            .iter()
            .filter_map(|key| {
                state
                    .entries
                    .get(key)
                    .and_then(|entry| entry.value().map(|value| Entry::new(key.clone(), value)))
            })
            .collect();
        return Step::Flush(keys, entries);
    }
    // Both queues empty at the same instant: the cycle is complete.
    state.cycle_running = false;
    state.drain_waiters();
    Step::Idle
}

/// Replace placeholder values with the store's answer.
///
/// Applied unconditionally over whatever is present at apply time - a local
/// write racing the in-flight batch is overwritten (the accepted relaxation).
/// Keys the store does not have leave their placeholder untouched; it already
/// reads as unset.
fn apply_fetch<K: StoreKey, V: StoreValue>(
    shared: &CacheShared<K, V>,
    requested: &[K],
    fetched: Vec<Entry<K, V>>,
) {
    let mut found: BTreeMap<K, V> = fetched.into_iter().map(|e| (e.key, e.value)).collect();
    let state = shared.lock_state();
    for key in requested {
        let Some(entry) = state.entries.get(key) else {
            continue;
        };
        if let Some(value) = found.remove(key) {
            entry.store(Some(value));
        }
    }
}

/// Count a cycle failure; returns true when the budget is exhausted and
/// background I/O shuts down for good.
fn record_failure<K: StoreKey, V: StoreValue>(
    shared: &CacheShared<K, V>,
    requeue: Requeue<K>,
    err: StoreError,
) -> bool {
    let mut guard = shared.lock_state();
    let state = &mut *guard;
    state.failures += 1;
    if state.failures >= shared.config.failure_budget {
        state.disabled = true;
        state.cycle_running = false;
        state.fetch_queue.clear();
        state.flush_queue.clear();
        state.drain_waiters();
        error!(
            failures = state.failures,
            error = %err,
            "background I/O disabled; cache now serves from memory only"
        );
        return true;
    }
    match requeue {
        Requeue::Fetch(keys) => {
            for key in keys {
                // A write queued while the batch was in flight wins over the
                // retried read.
                if !state.flush_queue.contains(&key) {
                    state.fetch_queue.insert(key);
                }
            }
        }
        Requeue::Flush(keys) => {
            state.flush_queue.extend(keys);
        }
    }
    warn!(
        failures = state.failures,
        budget = shared.config.failure_budget,
        error = %err,
        "background I/O cycle failed"
    );
    false
}

fn drain_pending_events<K: StoreKey, V: StoreValue>(
    shared: &CacheShared<K, V>,
    events: &mut broadcast::Receiver<StoreEvent<K, V>>,
    events_open: &mut bool,
) {
    if !*events_open {
        return;
    }
    loop {
        match events.try_recv() {
            Ok(event) => reconcile(shared, event),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "change stream lagged; treating as sync loss");
                reconcile(shared, StoreEvent::SyncLost);
            }
            Err(TryRecvError::Closed) => {
                *events_open = false;
                return;
            }
        }
    }
}

/// Apply a live store event to the tracked entries.
///
/// Precedence over a key's single mutable slot, highest first:
/// 1. an authoritative notification - applied here, and the key is dropped
///    from both queues so no queued local work can undo it;
/// 2. a fetch result - applied in [`apply_fetch`], overwriting the slot; a
///    flush queued behind it then transmits the post-fetch value;
/// 3. locally queued fetch/flush work.
pub(crate) fn reconcile<K: StoreKey, V: StoreValue>(
    shared: &CacheShared<K, V>,
    event: StoreEvent<K, V>,
) {
    match event {
        StoreEvent::Set(updates) => {
            let mut guard = shared.lock_state();
            let state = &mut *guard;
            for update in updates {
                let Entry { key, value } = update;
                let Some(entry) = state.entries.get(&key) else {
                    continue;
                };
                entry.store(Some(value));
                state.fetch_queue.remove(&key);
                state.flush_queue.remove(&key);
            }
        }
        StoreEvent::Delete(keys) => {
            let mut guard = shared.lock_state();
            let state = &mut *guard;
            for key in keys {
                let Some(entry) = state.entries.get(&key) else {
                    continue;
                };
                entry.store(None);
                state.fetch_queue.remove(&key);
                state.flush_queue.remove(&key);
            }
        }
        StoreEvent::SyncLost => {
            let mut guard = shared.lock_state();
            let state = &mut *guard;
            warn!(
                tracked = state.entries.len(),
                "sync lost; invalidating every tracked entry"
            );
            // Pending local writes are suspect too: the cache cannot prove
            // they predate the lost window, so they are dropped rather than
            // flushed over fresher service state.
            state.flush_queue.clear();
            for (key, entry) in &state.entries {
                entry.store(None);
                if !state.disabled {
                    state.fetch_queue.insert(key.clone());
                }
            }
            let refetch = !state.disabled && !state.fetch_queue.is_empty();
            drop(guard);
            if refetch {
                shared.wake.notify_one();
            }
        }
    }
}
