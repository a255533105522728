//! Transport abstraction.
//!
//! The low-level channel that multiplexes requests, responses, and
//! notifications over a single connection is not implemented here - it is
//! consumed through these traits. An implementation might run over a
//! websocket, a unix socket, or (in tests) an in-process channel.

use async_trait::async_trait;
use tessera_core::{Notification, Request, Response, StoreKey, StoreResult, StoreValue,
    TransportError};
use tokio::sync::mpsc;

/// One live connection to the service for a single named store.
///
/// `request` must resolve with a response or fail; it never hangs forever.
/// Connection-level failures are reported as
/// [`StoreError::Transport`](tessera_core::StoreError) so the client can tell
/// them apart from service-level rejections, which it must not retry.
#[async_trait]
pub trait Connection<K: StoreKey, V: StoreValue>: Send + Sync + 'static {
    /// Issue one request and await its response.
    async fn request(&self, request: Request<K, V>) -> StoreResult<Response<K, V>>;
}

/// Factory for connections, keyed by store name.
///
/// The notification receiver returned alongside each connection carries the
/// service's asynchronous change notifications. Closure of that receiver is
/// the disconnect signal, delivered at most once per connection; the channel
/// guarantees at most one outstanding logical connection per client at a time.
#[async_trait]
pub trait Transport<K: StoreKey, V: StoreValue>: Send + Sync + 'static {
    type Connection: Connection<K, V>;

    /// Open a fresh connection for `store`.
    async fn connect(
        &self,
        store: &str,
    ) -> Result<(Self::Connection, mpsc::Receiver<Notification<K, V>>), TransportError>;
}
