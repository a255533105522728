//! Key, value, and entry types.
//!
//! Keys and values are opaque to the synchronization layer. A key only has to
//! be ordered (range queries and pagination walk the table in key order) and
//! serializable (it crosses the process boundary); a value only has to be
//! serializable.

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Capability bound for table keys.
///
/// Ordering drives the range operations (`get_starting_from`,
/// `get_ending_at`) and pagination, ascending and descending. Blanket
/// implemented; never implement this by hand.
pub trait StoreKey:
    Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> StoreKey for T where
    T: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Capability bound for table values.
///
/// Values are an opaque payload; the synchronization layer assumes no internal
/// structure. Blanket implemented; never implement this by hand.
pub trait StoreValue: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A (key, value) pair - the unit of read, write, and notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}
