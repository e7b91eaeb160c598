//! Package manager releases (Helm CLI).

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-util"))]
use mockall::automock;
use tracing::{debug, info};

use crate::exec::run_tool;
use crate::{Error, Result};

#[cfg_attr(any(test, feature = "test-util"), automock)]
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Uninstall a release; returns false when it was not installed
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<bool>;
}

pub struct HelmCli {
    kubeconfig: Option<PathBuf>,
}

impl HelmCli {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self { kubeconfig }
    }

    fn args(&self, base: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        args
    }
}

#[async_trait]
impl ReleaseManager for HelmCli {
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<bool> {
        let args = self.args(&["uninstall", release, "--namespace", namespace, "--wait"]);
        let output = run_tool("helm", &args, None).await?;
        if output.success {
            info!(release, namespace, "Release uninstalled");
            return Ok(true);
        }
        let text = output.error_text();
        if is_release_missing(&text) {
            debug!(release, "Release not installed");
            return Ok(false);
        }
        Err(Error::backend("helm uninstall", text))
    }
}

fn is_release_missing(stderr: &str) -> bool {
    stderr.contains("release: not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_release_is_recognised() {
        assert!(is_release_missing(
            "Error: uninstall: Release not loaded: platform: release: not found"
        ));
        assert!(!is_release_missing("Error: Kubernetes cluster unreachable"));
    }

    #[test]
    fn kubeconfig_is_appended() {
        let helm = HelmCli::new(Some(PathBuf::from("/tmp/kc")));
        assert_eq!(
            helm.args(&["uninstall", "platform"]),
            vec!["uninstall", "platform", "--kubeconfig=/tmp/kc"]
        );
        assert_eq!(HelmCli::new(None).args(&["status"]), vec!["status"]);
    }
}
