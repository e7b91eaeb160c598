//! State Inspector: the read-only view of what the IaC backend tracks.
//!
//! Every call goes back to the state store; nothing is cached between calls
//! so engines never act on a stale picture of what exists.

use std::sync::Arc;

use tracing::debug;

use crate::iac::IacBackend;
use crate::Result;

/// Resources tracked by the IaC backend for one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedResourceSet {
    addresses: Vec<String>,
}

impl ManagedResourceSet {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }

    pub fn exists(&self) -> bool {
        !self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Exact address match
    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn into_addresses(self) -> Vec<String> {
        self.addresses
    }
}

/// Queries the IaC state store
#[derive(Clone)]
pub struct StateInspector {
    backend: Arc<dyn IacBackend>,
}

impl StateInspector {
    pub fn new(backend: Arc<dyn IacBackend>) -> Self {
        Self { backend }
    }

    /// Current resource set; `BackendUnavailable` when the store is unreachable.
    pub async fn list_managed_resources(&self) -> Result<ManagedResourceSet> {
        let addresses = self.backend.state_list().await?;
        debug!(count = addresses.len(), "Listed managed resources");
        Ok(ManagedResourceSet::new(addresses))
    }

    /// Precondition gate for destroy and backup
    pub async fn has_managed_resources(&self) -> Result<bool> {
        Ok(self.list_managed_resources().await?.exists())
    }
}
