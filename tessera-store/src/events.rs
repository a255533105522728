//! Change-notification events.
//!
//! Every [`KvStore`](crate::KvStore) handle exposes one ordered event stream
//! over a tokio broadcast channel. A single stream (rather than one channel
//! per event kind) preserves the relative order of sets and deletes, which the
//! cache's reconciliation depends on.

use tessera_core::Entry;

/// Default broadcast capacity for store event channels.
///
/// A subscriber that falls more than this many events behind is lagged by the
/// channel; lagging means changes were missed, which consumers must treat
/// exactly like [`StoreEvent::SyncLost`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A change visible through a store handle.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<K, V> {
    /// Entries were inserted or updated, by this handle or a peer.
    Set(Vec<Entry<K, V>>),

    /// Keys were removed, by this handle or a peer.
    Delete(Vec<K>),

    /// The handle can no longer guarantee it observed every change since the
    /// last successful load (transport outage, lagged subscriber). All
    /// previously-known state is suspect and must be refreshed.
    SyncLost,
}

impl<K, V> StoreEvent<K, V> {
    /// Event kind as a string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::Set(_) => "set",
            StoreEvent::Delete(_) => "delete",
            StoreEvent::SyncLost => "sync_lost",
        }
    }
}
