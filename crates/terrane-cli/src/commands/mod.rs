//! CLI commands

use std::path::Path;
use std::sync::Arc;

use terrane_backup::{AzureBlobStore, ObjectStore};
use terrane_common::cloud::{AzureCli, CloudProvider};
use terrane_common::cluster::{ClusterOps, KubeCluster};
use terrane_common::config::DeploymentConfig;
use terrane_common::confirm::{Confirmer, TerminalConfirmer};
use terrane_common::helm::{HelmCli, ReleaseManager};
use terrane_common::iac::{IacBackend, Terraform};
use terrane_common::Result;
use tracing::debug;

pub mod backup;
pub mod configure;
pub mod deploy;
pub mod destroy;

/// Production backends wired from the configuration
pub struct Backends {
    pub iac: Arc<dyn IacBackend>,
    pub cluster: Arc<dyn ClusterOps>,
    pub helm: Arc<dyn ReleaseManager>,
    pub cloud: Arc<dyn CloudProvider>,
    pub store: Arc<dyn ObjectStore>,
    pub confirmer: Arc<dyn Confirmer>,
}

impl Backends {
    pub fn from_config(config: &DeploymentConfig) -> Self {
        let kubeconfig = config.cluster.kubeconfig.clone();
        Self {
            iac: Arc::new(Terraform::new(
                config.iac.binary.clone(),
                config.iac.working_dir.clone(),
            )),
            cluster: Arc::new(KubeCluster::new(kubeconfig.clone())),
            helm: Arc::new(HelmCli::new(kubeconfig.clone())),
            cloud: Arc::new(AzureCli::new(kubeconfig)),
            store: Arc::new(AzureBlobStore),
            confirmer: Arc::new(TerminalConfirmer),
        }
    }
}

/// Load and validate `terrane.yaml`
pub fn load_config(path: &Path) -> Result<DeploymentConfig> {
    let config = DeploymentConfig::load(path)?;
    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}
