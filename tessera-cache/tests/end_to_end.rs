//! The whole layer cake: cache over wire client over in-process transport.

use std::time::Duration;

use tessera_cache::{EntryCache, EntryRef};
use tessera_client::{RemoteStore, RetryConfig};
use tessera_core::Entry;
use tessera_test_utils::{init_tracing, ChannelTransport, KvStore, MemoryStore};
use tokio::time::timeout;

type WireStore = RemoteStore<u32, String, ChannelTransport<u32, String>>;
type WireCache = EntryCache<u32, String, WireStore>;

async fn stack() -> (WireCache, ChannelTransport<u32, String>) {
    init_tracing();
    let transport = ChannelTransport::new(MemoryStore::new());
    let client = RemoteStore::connect(transport.clone(), "prefs", RetryConfig::default())
        .await
        .expect("connect");
    (EntryCache::new(client), transport)
}

/// Wait until the entry observably holds `expected`.
async fn wait_for(entry: &EntryRef<u32, String>, expected: Option<&str>) {
    let expected = expected.map(str::to_string);
    let mut watcher = entry.watch();
    let outcome = timeout(Duration::from_secs(2), async {
        loop {
            if *watcher.borrow_and_update() == expected {
                return;
            }
            if watcher.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "entry never reached {expected:?}");
}

#[tokio::test]
async fn reads_fetch_through_the_wire() {
    let (cache, transport) = stack().await;
    transport
        .service()
        .set(vec![Entry::new(1, "remote".to_string())])
        .await
        .unwrap();

    let entry = cache.get(&1);
    assert_eq!(entry.value(), None);

    wait_for(&entry, Some("remote")).await;
}

#[tokio::test]
async fn writes_flush_through_the_wire() {
    let (cache, transport) = stack().await;

    cache.set(5, "up".to_string());
    cache.sync().await;

    let stored = transport.service().get(&[5]).await.unwrap();
    assert_eq!(stored, vec![Entry::new(5, "up".to_string())]);
}

#[tokio::test]
async fn peer_writes_update_tracked_entries_live() {
    let (cache, transport) = stack().await;

    let entry = cache.get(&1);
    cache.sync().await;
    assert_eq!(entry.value(), None);

    // A peer writes behind the cache's back; the notification path carries
    // it all the way into the observable entry.
    transport
        .service()
        .set(vec![Entry::new(1, "peer".to_string())])
        .await
        .unwrap();

    wait_for(&entry, Some("peer")).await;
}

#[tokio::test]
async fn peer_deletes_clear_tracked_entries_live() {
    let (cache, transport) = stack().await;
    transport
        .service()
        .set(vec![Entry::new(1, "doomed".to_string())])
        .await
        .unwrap();

    let entry = cache.get(&1);
    wait_for(&entry, Some("doomed")).await;

    transport.service().delete(&[1]).await.unwrap();

    wait_for(&entry, None).await;
}

#[tokio::test]
async fn disconnect_refetches_changes_missed_while_down() {
    let (cache, transport) = stack().await;
    transport
        .service()
        .set(vec![Entry::new(1, "before".to_string())])
        .await
        .unwrap();

    let entry = cache.get(&1);
    wait_for(&entry, Some("before")).await;

    // Tear the link and mutate while no notifications can flow. The client's
    // sync-loss signal makes the cache refetch rather than trust stale state.
    transport.drop_connections();
    transport
        .service()
        .set(vec![Entry::new(1, "after".to_string())])
        .await
        .unwrap();

    wait_for(&entry, Some("after")).await;
}
