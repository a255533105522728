//! Tessera Client - Store Contract over a Wire
//!
//! [`RemoteStore`] implements the [`KvStore`](tessera_store::KvStore) contract
//! by translating every operation into one request/response exchange over a
//! [`Transport`]. The transport is unreliable: requests can fail at the
//! connection level and the connection itself can drop at any time. The client
//! absorbs both - transport errors are retried with linear backoff, and a
//! dropped connection is replaced by a background manager task that also
//! raises [`StoreEvent::SyncLost`](tessera_store::StoreEvent) so consumers
//! know to refresh.

mod client;
mod config;
mod transport;

pub use client::{ClientError, RemoteStore};
pub use config::{ConfigError, RetryConfig};
pub use transport::{Connection, Transport};

// Re-export the contract types callers interact with
pub use tessera_core::{
    Entry, Notification, Request, Response, StoreError, StoreKey, StoreResult, StoreValue,
    TransportError,
};
pub use tessera_store::{KvStore, KvStoreExt, StoreEvent};
