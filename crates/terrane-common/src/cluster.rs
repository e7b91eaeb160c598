//! Cluster control plane access.
//!
//! Native kube-rs calls for everything the API offers directly; `kubectl cp`
//! for pulling files out of a running pod.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams, PropagationPolicy};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::wait::await_condition;
use kube::{Client, Config};
#[cfg(any(test, feature = "test-util"))]
use mockall::automock;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::exec::run_checked;
use crate::{Error, Result};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a submitted job ended up after the bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobWait {
    /// A pod reports ready: its artifact is staged
    Staged,
    Failed(String),
    TimedOut,
}

/// Cluster operations used by the engines
#[cfg_attr(any(test, feature = "test-util"), automock)]
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Fail fast when the API server cannot be reached
    async fn check_reachable(&self) -> Result<()>;

    /// True when at least one pod matches and every match is Running
    async fn workload_running(&self, namespace: &str, selector: &str) -> Result<bool>;

    /// Ingress IP or hostname of a LoadBalancer service, once assigned
    async fn external_ip(&self, namespace: &str, service: &str) -> Result<Option<String>>;

    /// Names of LoadBalancer services in a namespace
    async fn load_balancer_services(&self, namespace: &str) -> Result<Vec<String>>;

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Block until the job stages its output, fails, or `timeout` elapses
    async fn wait_for_job(&self, namespace: &str, name: &str, timeout: Duration) -> Result<JobWait>;

    /// Name of the pod created for a job
    async fn job_pod(&self, namespace: &str, job: &str) -> Result<String>;

    /// Copy a file out of a pod
    async fn copy_from_pod(
        &self,
        namespace: &str,
        pod: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()>;

    /// Delete a job and its pods; absent jobs are not an error
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Check if a Job has a pod reporting ready
pub fn is_job_staged(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.ready)
        .map(|ready| ready > 0)
        .unwrap_or(false)
}

/// Check if a Job has failed
pub fn is_job_failed(job: &Job) -> bool {
    job_failure_message(job).is_some()
}

/// Failure message of a failed Job, if it failed
pub fn job_failure_message(job: &Job) -> Option<String> {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.type_ == "Failed" && c.status == "True")
                .map(|c| {
                    c.message
                        .clone()
                        .or_else(|| c.reason.clone())
                        .unwrap_or_else(|| "job failed".to_string())
                })
        })
}

fn is_pod_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Running")
        .unwrap_or(false)
}

fn service_ingress(service: &Service) -> Option<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|i| i.ip.clone().or_else(|| i.hostname.clone()))
        .filter(|s| !s.is_empty())
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 404)
}

/// kube-rs backed cluster access.
///
/// The client is created on first use so the kubeconfig written during
/// `deploy` (after the cluster exists) is picked up.
pub struct KubeCluster {
    kubeconfig: Option<PathBuf>,
    client: OnceCell<Client>,
}

impl KubeCluster {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self {
            kubeconfig,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| create_client(self.kubeconfig.as_deref()))
            .await
    }
}

/// Create a kube client from an optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::cluster(format!("failed to read kubeconfig {}: {}", path.display(), e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::cluster(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::cluster(format!("failed to infer kube config: {}", e)))?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| Error::cluster(format!("failed to create client: {}", e)))
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn check_reachable(&self) -> Result<()> {
        let client = self.client().await?;
        let version = client
            .apiserver_version()
            .await
            .map_err(|e| Error::cluster(format!("cluster unreachable: {}", e)))?;
        debug!(version = %version.git_version, "Cluster reachable");
        Ok(())
    }

    async fn workload_running(&self, namespace: &str, selector: &str) -> Result<bool> {
        let pods: Api<Pod> = Api::namespaced(self.client().await?.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        Ok(!list.items.is_empty() && list.items.iter().all(is_pod_running))
    }

    async fn external_ip(&self, namespace: &str, service: &str) -> Result<Option<String>> {
        let services: Api<Service> = Api::namespaced(self.client().await?.clone(), namespace);
        match services.get(service).await {
            Ok(svc) => Ok(service_ingress(&svc)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_balancer_services(&self, namespace: &str) -> Result<Vec<String>> {
        let services: Api<Service> = Api::namespaced(self.client().await?.clone(), namespace);
        let list = services.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter(|svc| {
                svc.spec.as_ref().and_then(|s| s.type_.as_deref()) == Some("LoadBalancer")
            })
            .filter_map(|svc| svc.metadata.name)
            .collect())
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let secrets: Api<Secret> = Api::namespaced(self.client().await?.clone(), namespace);
        match secrets.get_metadata(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        let namespace = job
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::validation("job has no namespace"))?;
        let jobs: Api<Job> = Api::namespaced(self.client().await?.clone(), namespace);
        jobs.create(&PostParams::default(), job).await?;
        info!(job = ?job.metadata.name, namespace, "Job submitted");
        Ok(())
    }

    async fn wait_for_job(&self, namespace: &str, name: &str, timeout: Duration) -> Result<JobWait> {
        let jobs: Api<Job> = Api::namespaced(self.client().await?.clone(), namespace);
        let settled = |job: Option<&Job>| job.is_some_and(|j| is_job_staged(j) || is_job_failed(j));

        match tokio::time::timeout(timeout, await_condition(jobs, name, settled)).await {
            Err(_) => Ok(JobWait::TimedOut),
            Ok(Err(e)) => Err(Error::cluster(format!("watching job {}: {}", name, e))),
            Ok(Ok(None)) => Ok(JobWait::Failed(format!("job {} was deleted", name))),
            Ok(Ok(Some(job))) => Ok(match job_failure_message(&job) {
                Some(message) => JobWait::Failed(message),
                None => JobWait::Staged,
            }),
        }
    }

    async fn job_pod(&self, namespace: &str, job: &str) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client().await?.clone(), namespace);
        let selector = format!("job-name={}", job);
        let list = pods.list(&ListParams::default().labels(&selector)).await?;
        list.items
            .into_iter()
            .find(is_pod_running)
            .and_then(|p| p.metadata.name)
            .ok_or_else(|| Error::cluster(format!("no running pod found for job {}", job)))
    }

    async fn copy_from_pod(
        &self,
        namespace: &str,
        pod: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let source = format!("{}/{}:{}", namespace, pod, remote_path);
        let destination = local_path.display().to_string();
        let mut args = vec!["cp".to_string(), source, destination];
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        run_checked("kubectl cp", "kubectl", &args, None).await?;
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        let jobs: Api<Job> = Api::namespaced(self.client().await?.clone(), namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        match jobs.delete(name, &params).await {
            Ok(_) => {
                info!(job = name, namespace, "Job deleted");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(job = name, "Job already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
