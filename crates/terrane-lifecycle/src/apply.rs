//! Apply engine: plan, approve, apply, then wait for the workload.
//!
//! Everything up to and including the apply itself is fatal. What follows
//! (outputs, cluster credentials, readiness) only degrades the outcome; the
//! infrastructure is already in place at that point.

use std::sync::Arc;

use terrane_common::cloud::CloudProvider;
use terrane_common::cluster::ClusterOps;
use terrane_common::config::DeploymentConfig;
use terrane_common::confirm::Confirmer;
use terrane_common::iac::{IacBackend, PlanSummary};
use terrane_common::outputs::DeploymentOutputs;
use terrane_common::pipeline::{
    LifecycleOperation, OperationKind, OperationMode, Pipeline, StepKind,
};
use terrane_common::poll::poll_until;
use terrane_common::{Error, Result};
use tracing::{info, warn};

/// Result of one apply invocation
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub plan: PlanSummary,
    /// Resources touched by the apply; zero when nothing was applied
    pub resources_changed: usize,
    pub applied: bool,
    pub outputs: DeploymentOutputs,
    /// `None` when readiness was not checked
    pub workload_ready: Option<bool>,
    pub external_ip: Option<String>,
    pub operation: LifecycleOperation,
}

pub struct ApplyEngine<'a> {
    config: &'a DeploymentConfig,
    iac: Arc<dyn IacBackend>,
    cloud: Arc<dyn CloudProvider>,
    cluster: Arc<dyn ClusterOps>,
    confirmer: Arc<dyn Confirmer>,
}

#[derive(Default)]
struct Progress {
    plan: PlanSummary,
    applied: bool,
    outputs: DeploymentOutputs,
    workload_ready: Option<bool>,
    external_ip: Option<String>,
}

impl Progress {
    fn into_report(self, pipeline: Pipeline) -> ApplyReport {
        ApplyReport {
            resources_changed: if self.applied { self.plan.total() } else { 0 },
            plan: self.plan,
            applied: self.applied,
            outputs: self.outputs,
            workload_ready: self.workload_ready,
            external_ip: self.external_ip,
            operation: pipeline.finish(),
        }
    }
}

impl<'a> ApplyEngine<'a> {
    pub fn new(
        config: &'a DeploymentConfig,
        iac: Arc<dyn IacBackend>,
        cloud: Arc<dyn CloudProvider>,
        cluster: Arc<dyn ClusterOps>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            config,
            iac,
            cloud,
            cluster,
            confirmer,
        }
    }

    pub async fn apply(&self, auto_approve: bool, plan_only: bool) -> Result<ApplyReport> {
        let mode = OperationMode::from_flags(auto_approve, plan_only);
        let mut pipeline = Pipeline::new(OperationKind::Apply, mode);
        let mut progress = Progress::default();
        let iac_config = &self.config.iac;
        let var_file = iac_config.var_file_path();

        pipeline
            .fatal("check inputs", async { self.check_inputs() })
            .await?;
        pipeline.fatal("init", self.iac.init()).await?;
        pipeline.fatal("validate", self.iac.validate()).await?;
        progress.plan = pipeline
            .fatal("plan", self.iac.plan(&var_file, &iac_config.plan_file))
            .await?;
        info!(plan = %progress.plan, "Plan ready");

        if mode == OperationMode::PlanOnly {
            pipeline.skip("apply", "plan-only");
            return Ok(progress.into_report(pipeline));
        }

        if mode == OperationMode::Interactive && progress.plan.has_changes() {
            let prompt = format!("Apply plan ({})?", progress.plan);
            if !self.confirmer.confirm(&prompt)? {
                info!("Apply declined, nothing changed");
                pipeline.abort("confirm");
                return Ok(progress.into_report(pipeline));
            }
            pipeline.succeed("confirm", StepKind::Fatal);
        }

        pipeline
            .fatal("apply", self.iac.apply(&iac_config.plan_file))
            .await?;
        progress.applied = true;

        progress.outputs = pipeline
            .advisory("read outputs", self.iac.outputs())
            .await
            .map(|raw| DeploymentOutputs::from_raw(&raw))
            .unwrap_or_default();

        if self.configure_credentials(&mut pipeline, &progress.outputs).await {
            progress.workload_ready = Some(self.wait_for_workload(&mut pipeline).await);
            progress.external_ip = self.wait_for_external_ip(&mut pipeline).await;
        } else {
            warn!("Cluster credentials unavailable, skipping readiness checks");
            pipeline.skip("workload readiness", "no cluster credentials");
            pipeline.skip("external ip", "no cluster credentials");
        }

        Ok(progress.into_report(pipeline))
    }

    fn check_inputs(&self) -> Result<()> {
        let iac = &self.config.iac;
        if !iac.working_dir.is_dir() {
            return Err(Error::precondition_with_hint(
                format!("IaC directory {} not found", iac.working_dir.display()),
                "Set iac.working_dir in terrane.yaml",
            ));
        }
        let var_file = iac.var_file_path();
        if !var_file.is_file() {
            return Err(Error::precondition_with_hint(
                format!("variables file {} not found", var_file.display()),
                "Create it from the module's example variables before deploying",
            ));
        }
        Ok(())
    }

    async fn configure_credentials(
        &self,
        pipeline: &mut Pipeline,
        outputs: &DeploymentOutputs,
    ) -> bool {
        match outputs.cluster() {
            Some((resource_group, cluster)) => pipeline
                .advisory(
                    "cluster credentials",
                    self.cloud.configure_cluster_credentials(resource_group, cluster),
                )
                .await
                .is_some(),
            None => {
                pipeline.degrade("cluster credentials", "cluster outputs unresolved");
                false
            }
        }
    }

    async fn wait_for_workload(&self, pipeline: &mut Pipeline) -> bool {
        let cluster = self.cluster.as_ref();
        let namespace = self.config.cluster.namespace.as_str();
        let selector = self.config.cluster.workload_selector.as_str();
        let policy = self.config.cluster.workload_poll.policy();

        let outcome = poll_until(&policy, "application pods", move || async move {
            match cluster.workload_running(namespace, selector).await {
                Ok(true) => Ok(Some(())),
                Ok(false) => Ok(None),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;
        pipeline.record_poll("workload readiness", outcome).is_some()
    }

    async fn wait_for_external_ip(&self, pipeline: &mut Pipeline) -> Option<String> {
        let cluster = self.cluster.as_ref();
        let namespace = self.config.cluster.namespace.as_str();
        let service = self.config.cluster.service.as_str();
        let policy = self.config.cluster.external_ip_poll.policy();

        let outcome = poll_until(&policy, "external IP", move || async move {
            cluster
                .external_ip(namespace, service)
                .await
                .map_err(|e| e.to_string())
        })
        .await;
        let ip = pipeline.record_poll("external ip", outcome);
        if let Some(ip) = &ip {
            info!(ip = %ip, "External IP assigned");
        }
        ip
    }
}
