//! Remote store client.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use tessera_core::{
    Entry, Notification, Request, Response, StoreError, StoreKey, StoreResult, StoreValue,
    TransportError,
};
use tessera_store::{KvStore, StoreEvent, DEFAULT_EVENT_CAPACITY};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, RetryConfig};
use crate::transport::{Connection, Transport};

/// Errors surfaced while constructing a [`RemoteStore`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("initial connect failed: {0}")]
    Connect(#[from] TransportError),
}

/// A [`KvStore`] that lives on the far side of a [`Transport`].
///
/// Every contract operation becomes exactly one request message awaiting one
/// response message. Requests failing at the transport level are retried with
/// linear backoff; the retry loop deliberately never re-dials the connection,
/// because a slow-but-alive connection must not be torn down - reconnection
/// is driven solely by the disconnect signal. On every disconnect the manager
/// task emits [`StoreEvent::SyncLost`] before replacing the connection, since
/// notifications may have been lost while down.
///
/// Handles are cheap to clone and share one connection; the background
/// manager task stops once the last handle is dropped.
pub struct RemoteStore<K: StoreKey, V: StoreValue, T: Transport<K, V>> {
    shared: Arc<Shared<K, V, T>>,
}

struct Shared<K: StoreKey, V: StoreValue, T: Transport<K, V>> {
    transport: T,
    store_name: String,
    retry: RetryConfig,
    conn: RwLock<Option<Arc<T::Connection>>>,
    events: broadcast::Sender<StoreEvent<K, V>>,
}

impl<K: StoreKey, V: StoreValue, T: Transport<K, V>> RemoteStore<K, V, T> {
    /// Open the initial connection for `store_name` and spawn the connection
    /// manager. Fails if the configuration is invalid or the first connect is
    /// refused; later disconnects are handled internally.
    pub async fn connect(
        transport: T,
        store_name: impl Into<String>,
        retry: RetryConfig,
    ) -> Result<Self, ClientError> {
        retry.validate()?;
        let store_name = store_name.into();
        let (conn, notifications) = transport.connect(&store_name).await?;
        info!(store = %store_name, "connected");

        let (events, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            transport,
            store_name,
            retry,
            conn: RwLock::new(Some(Arc::new(conn))),
            events,
        });
        tokio::spawn(run_manager(Arc::downgrade(&shared), notifications));
        Ok(Self { shared })
    }

    /// Name of the store this client is bound to.
    pub fn store_name(&self) -> &str {
        &self.shared.store_name
    }
}

impl<K: StoreKey, V: StoreValue, T: Transport<K, V>> Clone for RemoteStore<K, V, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: StoreKey, V: StoreValue, T: Transport<K, V>> Shared<K, V, T> {
    fn current_connection(&self) -> Option<Arc<T::Connection>> {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_connection(&self, conn: Option<Arc<T::Connection>>) {
        *self.conn.write().unwrap_or_else(PoisonError::into_inner) = conn;
    }

    fn send_event(&self, event: StoreEvent<K, V>) {
        // No subscribers is fine; the event stream is opt-in.
        let _ = self.events.send(event);
    }

    /// Issue `request`, retrying transport failures with linear backoff.
    ///
    /// The reconnect window (no connection installed yet) counts as a
    /// transport failure like any other, so requests racing a reconnect ride
    /// the same backoff until the manager installs the replacement.
    async fn request_with_retry(&self, request: Request<K, V>) -> StoreResult<Response<K, V>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = match self.current_connection() {
                Some(conn) => conn.request(request.clone()).await,
                None => Err(StoreError::transport("no active connection")),
            };
            match outcome {
                Ok(response) => return Ok(response),
                Err(err @ StoreError::Transport(_)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.request_backoff(attempt);
                    debug!(
                        kind = request.kind(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request after transport error"
                    );
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Unwrap the entry payload of a read response, substituting an empty
    /// result if the service answered with the wrong response kind.
    fn expect_entries(&self, response: Response<K, V>) -> Vec<Entry<K, V>> {
        match response {
            Response::Set { entries } => entries,
            Response::Ok => {
                warn!(
                    store = %self.store_name,
                    "read request answered without entries; substituting empty result"
                );
                Vec::new()
            }
        }
    }

    fn route_notification(&self, notification: Notification<K, V>) {
        debug!(store = %self.store_name, kind = notification.kind(), "routing notification");
        match notification {
            Notification::Set { entries } => self.send_event(StoreEvent::Set(entries)),
            Notification::Delete { keys } => self.send_event(StoreEvent::Delete(keys)),
        }
    }
}

/// Connection manager: forwards notifications until the connection drops,
/// then raises sync-loss and dials a replacement, forever.
///
/// Holds only a weak handle between events so the task winds down once every
/// [`RemoteStore`] clone is gone.
async fn run_manager<K: StoreKey, V: StoreValue, T: Transport<K, V>>(
    shared: Weak<Shared<K, V, T>>,
    mut notifications: mpsc::Receiver<Notification<K, V>>,
) {
    loop {
        while let Some(notification) = notifications.recv().await {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            shared.route_notification(notification);
        }

        // The notification channel closed: the connection is gone. Anything
        // the service announced while we were down is lost, so consumers must
        // refresh before trusting previously-known state.
        {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            warn!(store = %shared.store_name, "connection lost");
            shared.replace_connection(None);
            shared.send_event(StoreEvent::SyncLost);
        }

        let mut attempt: u32 = 0;
        notifications = loop {
            attempt += 1;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            match shared.transport.connect(&shared.store_name).await {
                Ok((conn, rx)) => {
                    shared.replace_connection(Some(Arc::new(conn)));
                    info!(store = %shared.store_name, attempt, "reconnected");
                    break rx;
                }
                Err(err) => {
                    let delay = shared.retry.reconnect_backoff(attempt);
                    warn!(
                        store = %shared.store_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "reconnect attempt failed"
                    );
                    drop(shared);
                    sleep(delay).await;
                }
            }
        };
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue, T: Transport<K, V>> KvStore<K, V> for RemoteStore<K, V, T> {
    async fn get(&self, keys: &[K]) -> StoreResult<Vec<Entry<K, V>>> {
        let response = self
            .shared
            .request_with_retry(Request::Get {
                keys: keys.to_vec(),
            })
            .await?;
        Ok(self.shared.expect_entries(response))
    }

    async fn get_starting_from(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>> {
        let response = self
            .shared
            .request_with_retry(Request::GetStartingFrom {
                bound: bound.cloned(),
                limit,
            })
            .await?;
        Ok(self.shared.expect_entries(response))
    }

    async fn get_ending_at(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>> {
        let response = self
            .shared
            .request_with_retry(Request::GetEndingAt {
                bound: bound.cloned(),
                limit,
            })
            .await?;
        Ok(self.shared.expect_entries(response))
    }

    async fn set(&self, entries: Vec<Entry<K, V>>) -> StoreResult<()> {
        self.shared
            .request_with_retry(Request::Set { entries })
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[K]) -> StoreResult<()> {
        self.shared
            .request_with_retry(Request::Delete {
                keys: keys.to_vec(),
            })
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> StoreResult<()> {
        self.shared.request_with_retry(Request::DeleteAll).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent<K, V>> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Connection that fails the first `fail_first` requests with the given
    /// error class, then succeeds with an empty read result.
    struct ScriptedConnection {
        fail_first: u32,
        service_errors: bool,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Connection<u32, String> for ScriptedConnection {
        async fn request(
            &self,
            _request: Request<u32, String>,
        ) -> StoreResult<Response<u32, String>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                if self.service_errors {
                    Err(StoreError::service("scripted rejection"))
                } else {
                    Err(StoreError::transport("scripted outage"))
                }
            } else {
                Ok(Response::Set { entries: vec![] })
            }
        }
    }

    struct ScriptedTransport {
        fail_first: u32,
        service_errors: bool,
        attempts: Arc<AtomicU32>,
        // Keeps notification senders alive so connections do not look dropped.
        senders: Mutex<Vec<mpsc::Sender<Notification<u32, String>>>>,
    }

    impl ScriptedTransport {
        fn new(fail_first: u32, service_errors: bool) -> Self {
            Self {
                fail_first,
                service_errors,
                attempts: Arc::new(AtomicU32::new(0)),
                senders: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport<u32, String> for ScriptedTransport {
        type Connection = ScriptedConnection;

        async fn connect(
            &self,
            _store: &str,
        ) -> Result<(Self::Connection, mpsc::Receiver<Notification<u32, String>>), TransportError>
        {
            let (tx, rx) = mpsc::channel(8);
            self.senders.lock().unwrap().push(tx);
            Ok((
                ScriptedConnection {
                    fail_first: self.fail_first,
                    service_errors: self.service_errors,
                    attempts: Arc::clone(&self.attempts),
                },
                rx,
            ))
        }
    }

    async fn client_over(
        transport: ScriptedTransport,
    ) -> (RemoteStore<u32, String, ScriptedTransport>, Arc<AtomicU32>) {
        let attempts = Arc::clone(&transport.attempts);
        let store = RemoteStore::connect(transport, "widgets", RetryConfig::default())
            .await
            .expect("connect");
        (store, attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried_until_success() {
        let (store, attempts) = client_over(ScriptedTransport::new(9, false)).await;

        let result = store.get(&[1]).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_after_ten_attempts() {
        let (store, attempts) = client_over(ScriptedTransport::new(u32::MAX, false)).await;

        let err = store.get(&[1]).await.unwrap_err();

        assert!(matches!(err, StoreError::Transport(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_errors_are_not_retried() {
        let (store, attempts) = client_over(ScriptedTransport::new(u32::MAX, true)).await;

        let err = store.set(vec![Entry::new(1, "x".to_string())]).await.unwrap_err();

        assert!(matches!(err, StoreError::Service { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_up_front() {
        let transport = ScriptedTransport::new(0, false);
        let result = RemoteStore::connect(
            transport,
            "widgets",
            RetryConfig::default().with_max_attempts(0),
        )
        .await;

        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    /// A connection that answers the write-family response to a read.
    struct WrongKindConnection;

    #[async_trait]
    impl Connection<u32, String> for WrongKindConnection {
        async fn request(
            &self,
            _request: Request<u32, String>,
        ) -> StoreResult<Response<u32, String>> {
            Ok(Response::Ok)
        }
    }

    struct WrongKindTransport {
        senders: Mutex<Vec<mpsc::Sender<Notification<u32, String>>>>,
    }

    #[async_trait]
    impl Transport<u32, String> for WrongKindTransport {
        type Connection = WrongKindConnection;

        async fn connect(
            &self,
            _store: &str,
        ) -> Result<(Self::Connection, mpsc::Receiver<Notification<u32, String>>), TransportError>
        {
            let (tx, rx) = mpsc::channel(8);
            self.senders.lock().unwrap().push(tx);
            Ok((WrongKindConnection, rx))
        }
    }

    #[tokio::test]
    async fn test_wrong_response_kind_substitutes_empty_read() {
        let transport = WrongKindTransport {
            senders: Mutex::new(Vec::new()),
        };
        let store = RemoteStore::connect(transport, "widgets", RetryConfig::default())
            .await
            .unwrap();

        let result = store.get_starting_from(None, 10).await.unwrap();

        assert!(result.is_empty());
    }
}
