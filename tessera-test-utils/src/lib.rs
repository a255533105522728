//! Tessera Test Utilities
//!
//! Centralized test infrastructure for the Tessera workspace:
//! - [`FlakyStore`]: a store with a scripted failure queue and call counting
//! - [`ChannelTransport`]: an in-process transport serving a [`MemoryStore`],
//!   with failure injection and forced disconnects
//! - [`init_tracing`]: idempotent tracing setup for integration tests

mod flaky_store;
mod transport;

pub use flaky_store::FlakyStore;
pub use transport::{ChannelConnection, ChannelTransport};

// Re-export the types test code touches constantly
pub use tessera_core::{Entry, StoreError, StoreResult, TransportError};
pub use tessera_store::{KvStore, KvStoreExt, MemoryStore, StoreEvent};

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a test tracing subscriber once per process.
///
/// Honors `RUST_LOG`; output is captured per test by the harness.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
