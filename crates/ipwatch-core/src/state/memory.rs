// # Memory State Store
//
// In-memory implementation of StateStore.
//
// All state is lost on restart: the first check after a restart is a
// first-ever run and records one change regardless of the fetched value.
// Useful for tests and for deployments where that initial event is
// harmless.

use std::sync::Arc;
use tokio::sync::RwLock;

use async_trait::async_trait;

use crate::Error;
use crate::traits::state_store::{LastKnownState, StateStore};

/// In-memory state store implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Option<LastKnownState>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the stored value (back to first-run)
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<LastKnownState>, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn store(&self, state: &LastKnownState) -> Result<(), Error> {
        *self.inner.write().await = Some(state.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store
        Ok(())
    }
}
