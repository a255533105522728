//! Tessera Store - Store Contract and In-Memory Implementation
//!
//! Defines the abstraction layer over a key-ordered table shared between
//! processes: the [`KvStore`] trait, the [`StoreEvent`] change-notification
//! stream, and the paginated [`KvStoreExt::list`] / [`KvStoreExt::list_reverse`]
//! walks. [`MemoryStore`] is the in-process reference implementation; the wire
//! client in `tessera-client` implements the same contract against a remote
//! service.

mod events;
mod memory;
mod traits;

pub use events::{StoreEvent, DEFAULT_EVENT_CAPACITY};
pub use memory::MemoryStore;
pub use traits::{KvStore, KvStoreExt};

// Re-export core types for convenience
pub use tessera_core::{
    Entry, StoreError, StoreKey, StoreResult, StoreValue, TransportError, LIST_PAGE_SIZE,
};
