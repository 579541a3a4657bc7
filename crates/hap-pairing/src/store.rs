//! In-memory pairing store.

use crate::traits::{Pairing, PairingStore};
use async_trait::async_trait;
use hap_core::error::Result;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    paired: bool,
    pairings: Vec<Pairing>,
}

/// Pairings kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryPairingStore {
    inner: RwLock<Inner>,
}

impl MemoryPairingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairingStore for MemoryPairingStore {
    async fn is_paired(&self) -> Result<bool> {
        Ok(self.inner.read().await.paired)
    }

    async fn get(&self, identifier: &str) -> Result<Option<Pairing>> {
        let inner = self.inner.read().await;
        Ok(inner
            .pairings
            .iter()
            .find(|p| p.identifier == identifier)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Pairing>> {
        Ok(self.inner.read().await.pairings.clone())
    }

    async fn add(&self, pairing: Pairing) -> Result<()> {
        let mut inner = self.inner.write().await;
        debug!(identifier = %pairing.identifier, permission = ?pairing.permission, "Storing pairing");

        match inner
            .pairings
            .iter_mut()
            .find(|p| p.identifier == pairing.identifier)
        {
            Some(existing) => *existing = pairing,
            None => inner.pairings.push(pairing),
        }
        Ok(())
    }

    async fn remove(&self, identifier: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.pairings.retain(|p| p.identifier != identifier);
        debug!(identifier, "Removed pairing");
        Ok(())
    }

    async fn set_paired(&self, paired: bool) -> Result<()> {
        self.inner.write().await.paired = paired;
        Ok(())
    }
}
