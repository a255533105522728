//! Store contract traits.
//!
//! [`KvStore`] is the abstract contract over a keyed, ordered table;
//! [`KvStoreExt`] layers the lazy full-table walks on top of the bounded
//! range operations.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tessera_core::{Entry, StoreKey, StoreResult, StoreValue, LIST_PAGE_SIZE};
use tokio::sync::broadcast;

use crate::StoreEvent;

/// Abstract operations on a keyed, ordered table.
///
/// Implementations must be usable behind an `Arc` from multiple tasks. All
/// reads are point-in-time snapshots; consistency across calls comes only
/// from the event stream returned by [`subscribe`](KvStore::subscribe).
#[async_trait]
pub trait KvStore<K: StoreKey, V: StoreValue>: Send + Sync {
    /// Point lookup. Keys not present are simply absent from the result.
    async fn get(&self, keys: &[K]) -> StoreResult<Vec<Entry<K, V>>>;

    /// Up to `limit` entries with key >= `bound` (from the start if unset),
    /// in ascending key order.
    async fn get_starting_from(
        &self,
        bound: Option<&K>,
        limit: usize,
    ) -> StoreResult<Vec<Entry<K, V>>>;

    /// Up to `limit` entries with key <= `bound` (from the end if unset),
    /// in descending key order.
    async fn get_ending_at(&self, bound: Option<&K>, limit: usize)
        -> StoreResult<Vec<Entry<K, V>>>;

    /// Upsert. Last write wins per key within the call.
    async fn set(&self, entries: Vec<Entry<K, V>>) -> StoreResult<()>;

    /// Remove the given keys. Removing an absent key is not an error.
    async fn delete(&self, keys: &[K]) -> StoreResult<()>;

    /// Remove every entry in the table.
    async fn delete_all(&self) -> StoreResult<()>;

    /// Subscribe to changes visible through this handle, regardless of origin.
    ///
    /// A receiver that lags behind the channel capacity has missed changes and
    /// must handle that case as [`StoreEvent::SyncLost`].
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent<K, V>>;
}

/// Convenience extension methods over any [`KvStore`].
pub trait KvStoreExt<K: StoreKey, V: StoreValue>: KvStore<K, V> {
    /// Lazily walk the whole table in ascending key order.
    ///
    /// Pages through [`get_starting_from`](KvStore::get_starting_from) with
    /// [`LIST_PAGE_SIZE`]-entry pages, advancing the bound past the last key
    /// yielded. The range bound is inclusive, so each follow-up page leads
    /// with the previous page's last key; that entry is skipped rather than
    /// yielded twice. Restartable per call; finite.
    fn list(&self) -> BoxStream<'_, StoreResult<Entry<K, V>>>
    where
        Self: Sized,
    {
        Box::pin(async_stream::try_stream! {
            let mut bound: Option<K> = None;
            loop {
                let page = self.get_starting_from(bound.as_ref(), LIST_PAGE_SIZE).await?;
                let full_page = page.len() == LIST_PAGE_SIZE;
                let mut advanced = false;
                for entry in page {
                    if let Some(b) = &bound {
                        if entry.key <= *b {
                            continue;
                        }
                    }
                    bound = Some(entry.key.clone());
                    advanced = true;
                    yield entry;
                }
                if !full_page || !advanced {
                    break;
                }
            }
        })
    }

    /// Lazily walk the whole table in descending key order.
    fn list_reverse(&self) -> BoxStream<'_, StoreResult<Entry<K, V>>>
    where
        Self: Sized,
    {
        Box::pin(async_stream::try_stream! {
            let mut bound: Option<K> = None;
            loop {
                let page = self.get_ending_at(bound.as_ref(), LIST_PAGE_SIZE).await?;
                let full_page = page.len() == LIST_PAGE_SIZE;
                let mut advanced = false;
                for entry in page {
                    if let Some(b) = &bound {
                        if entry.key >= *b {
                            continue;
                        }
                    }
                    bound = Some(entry.key.clone());
                    advanced = true;
                    yield entry;
                }
                if !full_page || !advanced {
                    break;
                }
            }
        })
    }
}

impl<K: StoreKey, V: StoreValue, S: KvStore<K, V>> KvStoreExt<K, V> for S {}
