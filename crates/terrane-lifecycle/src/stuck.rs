//! Resources that commonly fail clean teardown.
//!
//! Consulted only by the destroy engine in force mode. Only addresses in the
//! intersection of this list and the current managed set are ever detached.

use terrane_common::state::ManagedResourceSet;

/// Built-in policy table: cluster-scoped objects whose provider loses its
/// connection once the cluster starts going away.
pub const DEFAULT_STUCK_RESOURCES: &[&str] = &[
    "helm_release.platform",
    "kubernetes_secret.database",
    "kubernetes_config_map.platform",
    "kubernetes_namespace.platform",
];

/// Ordered list of resource addresses eligible for detachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckResourceList {
    addresses: Vec<String>,
}

impl Default for StuckResourceList {
    fn default() -> Self {
        Self::new(DEFAULT_STUCK_RESOURCES.iter().map(|s| s.to_string()).collect())
    }
}

impl StuckResourceList {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }

    /// Configured override, or the built-in table
    pub fn from_config(overrides: Option<&[String]>) -> Self {
        match overrides {
            Some(list) => Self::new(list.to_vec()),
            None => Self::default(),
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Entries present in `resources`, in policy order. Exact matches only.
    pub fn present_in(&self, resources: &ManagedResourceSet) -> Vec<String> {
        self.addresses
            .iter()
            .filter(|a| resources.contains(a))
            .cloned()
            .collect()
    }
}
