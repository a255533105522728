//! In-process transport over a memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tessera_core::{Notification, Request, Response, StoreError, StoreKey, StoreResult,
    StoreValue, TransportError};
use tessera_client::{Connection, Transport};
use tessera_store::{KvStore, MemoryStore, StoreEvent};
use tokio::sync::{mpsc, watch};

const NOTIFICATION_BUFFER: usize = 64;

/// A [`Transport`] whose service side is an in-process [`MemoryStore`].
///
/// Each connection gets a forwarder task translating the store's
/// `Set`/`Delete` events into wire notifications; dropping the forwarder
/// closes the notification channel, which is the disconnect signal the client
/// contract expects. Failure injection covers the whole error taxonomy:
/// transport errors (`fail_requests`), service rejections (`reject_requests`),
/// and forced disconnects (`drop_connections`).
pub struct ChannelTransport<K: StoreKey, V: StoreValue> {
    service: MemoryStore<K, V>,
    state: Arc<Mutex<TransportState>>,
}

struct TransportState {
    fail_requests: u32,
    reject_requests: u32,
    connections_opened: u32,
    kill_switches: Vec<watch::Sender<bool>>,
}

impl<K, V> Clone for ChannelTransport<K, V>
where
    K: StoreKey,
    V: StoreValue,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: StoreKey, V: StoreValue> ChannelTransport<K, V> {
    pub fn new(service: MemoryStore<K, V>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(TransportState {
                fail_requests: 0,
                reject_requests: 0,
                connections_opened: 0,
                kill_switches: Vec::new(),
            })),
        }
    }

    /// The authoritative store this transport serves.
    pub fn service(&self) -> &MemoryStore<K, V> {
        &self.service
    }

    /// Fail the next `n` requests with a transport error.
    pub fn fail_requests(&self, n: u32) {
        self.state.lock().expect("transport state poisoned").fail_requests = n;
    }

    /// Reject the next `n` requests with a service error.
    pub fn reject_requests(&self, n: u32) {
        self.state.lock().expect("transport state poisoned").reject_requests = n;
    }

    /// Number of connections opened so far, reconnects included.
    pub fn connections_opened(&self) -> u32 {
        self.state.lock().expect("transport state poisoned").connections_opened
    }

    /// Force-disconnect every live connection.
    ///
    /// Their notification channels close and any later request on them fails
    /// with a transport error, exactly like a torn network link.
    pub fn drop_connections(&self) {
        let switches = {
            let mut state = self.state.lock().expect("transport state poisoned");
            std::mem::take(&mut state.kill_switches)
        };
        for kill in switches {
            let _ = kill.send(true);
        }
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> Transport<K, V> for ChannelTransport<K, V> {
    type Connection = ChannelConnection<K, V>;

    async fn connect(
        &self,
        _store: &str,
    ) -> Result<(Self::Connection, mpsc::Receiver<Notification<K, V>>), TransportError> {
        let (kill_tx, kill_rx) = watch::channel(false);
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_BUFFER);
        {
            let mut state = self.state.lock().expect("transport state poisoned");
            state.connections_opened += 1;
            state.kill_switches.push(kill_tx);
        }

        let mut events = self.service.subscribe();
        let mut kill = kill_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = kill.changed() => {
                        if changed.is_err() || *kill.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(StoreEvent::Set(entries)) => {
                            if notify_tx.send(Notification::Set { entries }).await.is_err() {
                                break;
                            }
                        }
                        Ok(StoreEvent::Delete(keys)) => {
                            if notify_tx.send(Notification::Delete { keys }).await.is_err() {
                                break;
                            }
                        }
                        // Sync-loss is a client-side condition; the service
                        // never puts it on the wire.
                        Ok(StoreEvent::SyncLost) => {}
                        Err(_) => break,
                    }
                }
            }
            // Dropping notify_tx here closes the client's receiver: disconnect.
        });

        Ok((
            ChannelConnection {
                service: self.service.clone(),
                state: Arc::clone(&self.state),
                killed: kill_rx,
            },
            notify_rx,
        ))
    }
}

/// One live connection handed out by [`ChannelTransport`].
pub struct ChannelConnection<K: StoreKey, V: StoreValue> {
    service: MemoryStore<K, V>,
    state: Arc<Mutex<TransportState>>,
    killed: watch::Receiver<bool>,
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> Connection<K, V> for ChannelConnection<K, V> {
    async fn request(&self, request: Request<K, V>) -> StoreResult<Response<K, V>> {
        if *self.killed.borrow() {
            return Err(StoreError::transport("connection closed"));
        }
        {
            let mut state = self.state.lock().expect("transport state poisoned");
            if state.fail_requests > 0 {
                state.fail_requests -= 1;
                return Err(StoreError::transport("injected transport failure"));
            }
            if state.reject_requests > 0 {
                state.reject_requests -= 1;
                return Err(StoreError::service("injected service rejection"));
            }
        }

        match request {
            Request::Get { keys } => {
                let entries = self.service.get(&keys).await?;
                Ok(Response::Set { entries })
            }
            Request::GetStartingFrom { bound, limit } => {
                let entries = self.service.get_starting_from(bound.as_ref(), limit).await?;
                Ok(Response::Set { entries })
            }
            Request::GetEndingAt { bound, limit } => {
                let entries = self.service.get_ending_at(bound.as_ref(), limit).await?;
                Ok(Response::Set { entries })
            }
            Request::Set { entries } => {
                self.service.set(entries).await?;
                Ok(Response::Ok)
            }
            Request::Delete { keys } => {
                self.service.delete(&keys).await?;
                Ok(Response::Ok)
            }
            Request::DeleteAll => {
                self.service.delete_all().await?;
                Ok(Response::Ok)
            }
        }
    }
}
