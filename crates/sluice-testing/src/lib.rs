//! Test support for the sluice crates.
//!
//! Provides in-memory stand-ins for the external collaborators: a scripted
//! broker with a parallel delivery pool and blob stores with failure
//! injection, plus fixtures and a [`TestEnv`] bundling them for coordinator
//! and endpoint tests.

#![forbid(unsafe_code)]

pub mod broker;
pub mod fixtures;
pub mod store;

use std::sync::Arc;

use sluice_core::{MemoryBlobStore, TestClock};

pub use broker::ScriptedBroker;
pub use fixtures::{key_spec, message_batch, text_message, unique_message_id};
pub use store::FlakyBlobStore;

/// In-memory environment for exercising pull sessions end to end.
pub struct TestEnv {
    /// Scripted broker the coordinator receives from.
    pub broker: Arc<ScriptedBroker>,
    /// Blob store persisted objects land in.
    pub store: Arc<MemoryBlobStore>,
    /// Deterministic clock.
    pub clock: Arc<TestClock>,
}

impl TestEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self {
            broker: Arc::new(ScriptedBroker::new()),
            store: Arc::new(MemoryBlobStore::new()),
            clock: Arc::new(TestClock::new()),
        }
    }

    /// Scripts a batch of numbered text messages on the broker.
    pub fn script_messages(&self, count: usize) {
        for (id, payload) in message_batch(count) {
            self.broker.push_message(id, payload);
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
