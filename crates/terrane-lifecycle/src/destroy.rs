//! Destroy engine with stuck-resource recovery.
//!
//! Teardown order: uninstall the application release, wait for its load
//! balancers to be released, then destroy the infrastructure. In force mode a
//! failed destroy detaches the known stuck resources that are actually in
//! state and retries exactly once.

use std::sync::Arc;

use terrane_common::cluster::ClusterOps;
use terrane_common::config::DeploymentConfig;
use terrane_common::confirm::Confirmer;
use terrane_common::helm::ReleaseManager;
use terrane_common::iac::IacBackend;
use terrane_common::pipeline::{
    LifecycleOperation, OperationKind, OperationMode, Pipeline, StepKind,
};
use terrane_common::poll::poll_until;
use terrane_common::state::StateInspector;
use terrane_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::stuck::StuckResourceList;

/// Phrase the operator must type to confirm a destroy
pub const CONFIRM_PHRASE: &str = "destroy";

#[derive(Debug, Clone)]
pub struct DestroyReport {
    /// Addresses tracked when the operation started
    pub planned: Vec<String>,
    /// Addresses removed from state without deleting the resource
    pub detached: Vec<String>,
    /// Addresses still tracked afterwards
    pub remaining_resources: Vec<String>,
    pub operation: LifecycleOperation,
}

pub struct DestroyEngine<'a> {
    config: &'a DeploymentConfig,
    iac: Arc<dyn IacBackend>,
    inspector: StateInspector,
    cluster: Arc<dyn ClusterOps>,
    helm: Arc<dyn ReleaseManager>,
    confirmer: Arc<dyn Confirmer>,
    stuck: StuckResourceList,
}

impl<'a> DestroyEngine<'a> {
    pub fn new(
        config: &'a DeploymentConfig,
        iac: Arc<dyn IacBackend>,
        cluster: Arc<dyn ClusterOps>,
        helm: Arc<dyn ReleaseManager>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            config,
            inspector: StateInspector::new(iac.clone()),
            iac,
            cluster,
            helm,
            confirmer,
            stuck: StuckResourceList::from_config(config.destroy.stuck_resources.as_deref()),
        }
    }

    pub async fn destroy(&self, auto_approve: bool, force: bool) -> Result<DestroyReport> {
        let mode = OperationMode::from_flags(auto_approve, false);
        let mut pipeline = Pipeline::new(OperationKind::Destroy, mode);

        let resources = pipeline
            .fatal("inspect state", self.inspector.list_managed_resources())
            .await?;
        if !resources.exists() {
            info!("No managed resources, nothing to destroy");
            pipeline.skip("destroy", "no managed resources");
            return Ok(DestroyReport {
                planned: Vec::new(),
                detached: Vec::new(),
                remaining_resources: Vec::new(),
                operation: pipeline.finish(),
            });
        }

        info!(count = resources.len(), "Resources scheduled for destruction");
        for address in resources.addresses() {
            info!(address = %address, "Will destroy");
        }
        let planned = resources.into_addresses();

        if mode == OperationMode::Interactive {
            let prompt = format!("Destroy {} managed resources?", planned.len());
            if !self.confirmer.confirm_phrase(&prompt, CONFIRM_PHRASE)? {
                info!("Destroy declined, nothing changed");
                pipeline.abort("confirm");
                return Ok(DestroyReport {
                    remaining_resources: planned.clone(),
                    planned,
                    detached: Vec::new(),
                    operation: pipeline.finish(),
                });
            }
            pipeline.succeed("confirm", StepKind::Fatal);
        }

        let cluster = &self.config.cluster;
        pipeline
            .advisory(
                "uninstall release",
                self.helm.uninstall(&cluster.release, &cluster.namespace),
            )
            .await;
        self.wait_for_load_balancers(&mut pipeline).await;

        let var_file = self.config.iac.var_file_path();
        let mut detached = Vec::new();
        if !force {
            pipeline
                .fatal("destroy", async {
                    self.iac
                        .destroy(&var_file)
                        .await
                        .map_err(|e| Error::destroy_failed(e.to_string()))
                })
                .await?;
        } else if let Err(e) = self.iac.destroy(&var_file).await {
            warn!(error = %e, "Destroy failed, detaching stuck resources and retrying");
            pipeline.recovered("destroy", e.to_string());
            detached = self.detach_stuck(&mut pipeline).await;
            if pipeline
                .advisory("destroy retry", self.iac.destroy(&var_file))
                .await
                .is_none()
            {
                warn!("Destroy still failing after detaching stuck resources, giving up");
            }
        } else {
            pipeline.succeed("destroy", StepKind::Fatal);
        }

        let remaining_resources = self.verify_teardown(&mut pipeline).await;

        Ok(DestroyReport {
            planned,
            detached,
            remaining_resources,
            operation: pipeline.finish(),
        })
    }

    /// Detach every stuck resource that is currently in state.
    async fn detach_stuck(&self, pipeline: &mut Pipeline) -> Vec<String> {
        let Some(current) = pipeline
            .advisory("re-read state", self.inspector.list_managed_resources())
            .await
        else {
            return Vec::new();
        };

        let mut detached = Vec::new();
        for address in self.stuck.present_in(&current) {
            let step = format!("detach {}", address);
            if pipeline
                .advisory(&step, self.iac.state_rm(&address))
                .await
                .is_some()
            {
                info!(address = %address, "Detached from state");
                detached.push(address);
            }
        }
        if detached.is_empty() {
            warn!("No known stuck resources in state");
        }
        detached
    }

    async fn wait_for_load_balancers(&self, pipeline: &mut Pipeline) {
        let cluster = self.cluster.as_ref();
        let namespace = self.config.cluster.namespace.as_str();
        let policy = self.config.destroy.load_balancer_poll.policy();

        let outcome = poll_until(&policy, "load balancer release", move || async move {
            match cluster.load_balancer_services(namespace).await {
                Ok(services) if services.is_empty() => Ok(Some(())),
                Ok(services) => {
                    debug!(?services, "Load balancers still present");
                    Ok(None)
                }
                Err(e) => Err(e.to_string()),
            }
        })
        .await;
        pipeline.record_poll("load balancer release", outcome);
    }

    async fn verify_teardown(&self, pipeline: &mut Pipeline) -> Vec<String> {
        let Some(left) = pipeline
            .advisory("verify state", self.inspector.list_managed_resources())
            .await
        else {
            return Vec::new();
        };
        if left.exists() {
            warn!(count = left.len(), "Resources still tracked after destroy");
            for address in left.addresses() {
                warn!(address = %address, "Still tracked");
            }
            pipeline.degrade(
                "verify state",
                format!("{} resources still tracked", left.len()),
            );
        }
        left.into_addresses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockCluster, MockConfirm, MockHelm, MockIac};
    use std::sync::Mutex;
    use terrane_common::config::PollSettings;
    use terrane_common::pipeline::{Outcome, StepStatus};

    fn config() -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.destroy.load_balancer_poll = PollSettings::new(1, 2);
        config
    }

    /// Backend whose state shrinks as `state_rm` is called
    fn stateful_iac(initial: &[&str]) -> (MockIac, Arc<Mutex<Vec<String>>>) {
        let state = Arc::new(Mutex::new(
            initial.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        ));
        let mut iac = MockIac::new();
        let list = state.clone();
        iac.expect_state_list()
            .returning(move || Ok(list.lock().unwrap().clone()));
        let rm = state.clone();
        iac.expect_state_rm().returning(move |address| {
            rm.lock().unwrap().retain(|a| a != address);
            Ok(())
        });
        (iac, state)
    }

    fn quiet_cluster() -> MockCluster {
        let mut cluster = MockCluster::new();
        cluster
            .expect_load_balancer_services()
            .returning(|_| Ok(vec![]));
        cluster
    }

    fn helm_ok() -> MockHelm {
        let mut helm = MockHelm::new();
        helm.expect_uninstall().returning(|_, _| Ok(true));
        helm
    }

    fn engine<'a>(
        config: &'a DeploymentConfig,
        iac: MockIac,
        cluster: MockCluster,
        helm: MockHelm,
        confirm: MockConfirm,
    ) -> DestroyEngine<'a> {
        DestroyEngine::new(
            config,
            Arc::new(iac),
            Arc::new(cluster),
            Arc::new(helm),
            Arc::new(confirm),
        )
    }

    #[tokio::test]
    async fn empty_state_is_a_noop() {
        let config = config();
        let mut iac = MockIac::new();
        iac.expect_state_list().times(1).returning(|| Ok(vec![]));
        iac.expect_destroy().times(0);
        let mut confirm = MockConfirm::new();
        confirm.expect_confirm_phrase().times(0);

        let report = engine(&config, iac, MockCluster::new(), MockHelm::new(), confirm)
            .destroy(false, false)
            .await
            .unwrap();

        assert!(report.planned.is_empty());
        assert_eq!(report.operation.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn wrong_phrase_aborts_without_mutation() {
        let config = config();
        let (mut iac, _state) = stateful_iac(&["azurerm_resource_group.main"]);
        iac.expect_destroy().times(0);
        let mut confirm = MockConfirm::new();
        confirm
            .expect_confirm_phrase()
            .withf(|_, phrase| phrase == "destroy")
            .returning(|_, _| Ok(false));

        let report = engine(&config, iac, MockCluster::new(), MockHelm::new(), confirm)
            .destroy(false, false)
            .await
            .unwrap();

        assert_eq!(report.operation.outcome, Outcome::Aborted);
        assert_eq!(report.remaining_resources, vec!["azurerm_resource_group.main"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_destroy_leaves_nothing_tracked() {
        let config = config();
        let (mut iac, state) = stateful_iac(&["azurerm_resource_group.main"]);
        let cleared = state.clone();
        iac.expect_destroy().times(1).returning(move |_| {
            cleared.lock().unwrap().clear();
            Ok(())
        });

        let report = engine(&config, iac, quiet_cluster(), helm_ok(), MockConfirm::new())
            .destroy(true, false)
            .await
            .unwrap();

        assert!(report.remaining_resources.is_empty());
        assert!(report.detached.is_empty());
        assert_eq!(report.operation.outcome, Outcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_force_suggests_force() {
        let config = config();
        let (mut iac, state) = stateful_iac(&["kubernetes_namespace.platform"]);
        iac.expect_destroy()
            .times(1)
            .returning(|_| Err(Error::backend("terraform destroy", "context deadline exceeded")));

        let err = engine(&config, iac, quiet_cluster(), helm_ok(), MockConfirm::new())
            .destroy(true, false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DestroyFailed { .. }));
        assert!(err.remediation().unwrap().contains("terrane destroy --force"));
        // nothing detached without --force
        assert_eq!(*state.lock().unwrap(), vec!["kubernetes_namespace.platform"]);
    }

    #[tokio::test(start_paused = true)]
    async fn force_detaches_only_stuck_resources_and_tolerates_second_failure() {
        let config = config();
        let (mut iac, state) = stateful_iac(&[
            "azurerm_kubernetes_cluster.main",
            "helm_release.platform",
            "kubernetes_namespace.platform",
            "helm_release.monitoring",
        ]);
        iac.expect_destroy()
            .times(2)
            .returning(|_| Err(Error::backend("terraform destroy", "namespace stuck terminating")));

        let report = engine(&config, iac, quiet_cluster(), helm_ok(), MockConfirm::new())
            .destroy(true, true)
            .await
            .unwrap();

        assert_eq!(
            report.detached,
            vec!["helm_release.platform", "kubernetes_namespace.platform"]
        );
        let left = state.lock().unwrap().clone();
        assert_eq!(
            left,
            vec!["azurerm_kubernetes_cluster.main", "helm_release.monitoring"]
        );
        assert_eq!(report.remaining_resources, left);
        assert_eq!(report.operation.outcome, Outcome::Partial);
    }

    #[tokio::test(start_paused = true)]
    async fn force_retry_success_is_success() {
        let config = config();
        let (mut iac, state) = stateful_iac(&["helm_release.platform", "azurerm_resource_group.main"]);
        let attempts = Arc::new(Mutex::new(0));
        let cleared = state.clone();
        iac.expect_destroy().times(2).returning(move |_| {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            if *n == 1 {
                return Err(Error::backend("terraform destroy", "release uninstall timed out"));
            }
            cleared.lock().unwrap().clear();
            Ok(())
        });

        let report = engine(&config, iac, quiet_cluster(), helm_ok(), MockConfirm::new())
            .destroy(true, true)
            .await
            .unwrap();

        assert_eq!(report.detached, vec!["helm_release.platform"]);
        assert_eq!(report.operation.outcome, Outcome::Success);
        assert!(report
            .operation
            .steps
            .iter()
            .any(|s| s.name == "destroy" && matches!(s.status, StepStatus::Recovered(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn release_and_load_balancer_problems_are_advisory() {
        let config = config();
        let (mut iac, state) = stateful_iac(&["azurerm_resource_group.main"]);
        let cleared = state.clone();
        iac.expect_destroy().times(1).returning(move |_| {
            cleared.lock().unwrap().clear();
            Ok(())
        });
        let mut helm = MockHelm::new();
        helm.expect_uninstall()
            .returning(|_, _| Err(Error::backend("helm uninstall", "cluster unreachable")));
        let mut cluster = MockCluster::new();
        cluster
            .expect_load_balancer_services()
            .times(2)
            .returning(|_| Ok(vec!["platform".to_string()]));

        let report = engine(&config, iac, cluster, helm, MockConfirm::new())
            .destroy(true, false)
            .await
            .unwrap();

        assert!(report.remaining_resources.is_empty());
        assert_eq!(report.operation.outcome, Outcome::Partial);
    }
}
