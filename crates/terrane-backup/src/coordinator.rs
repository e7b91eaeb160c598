//! Backup/restore coordinator.
//!
//! Every action first checks that a deployment exists. Export runs a one-shot
//! cluster job and always cleans up after itself; restores never touch the
//! source database.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use terrane_common::cloud::{CloudProvider, RetentionInfo};
use terrane_common::cluster::{ClusterOps, JobWait};
use terrane_common::config::DeploymentConfig;
use terrane_common::iac::IacBackend;
use terrane_common::outputs::DeploymentOutputs;
use terrane_common::pipeline::{OperationKind, OperationMode, Pipeline};
use terrane_common::state::StateInspector;
use terrane_common::{Error, Result};

use crate::export::{ExportJob, ARTIFACT_PATH};
use crate::object_store::{BackupArtifact, BlobLocation, ObjectStore};
use crate::restore::{
    artifact_restore_commands, validate_artifact_name, validate_point_in_time, RestoreMode,
    RestoreRequest, RestoreResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupAction {
    Status,
    List,
    Export,
    Restore(RestoreRequest),
}

/// Consolidated backup posture. `None` renders as unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupStatus {
    pub database_server: Option<String>,
    pub storage_account: Option<String>,
    pub container: String,
    pub retention: Option<RetentionInfo>,
    pub artifact_count: Option<usize>,
    pub latest_artifact: Option<BackupArtifact>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupResult {
    /// Nothing is deployed; nothing was done
    NoDeployment,
    Status(BackupStatus),
    List(Vec<BackupArtifact>),
    Exported(BackupArtifact),
    Restored(RestoreResult),
}

pub struct BackupCoordinator<'a> {
    config: &'a DeploymentConfig,
    iac: Arc<dyn IacBackend>,
    inspector: StateInspector,
    cluster: Arc<dyn ClusterOps>,
    cloud: Arc<dyn CloudProvider>,
    store: Arc<dyn ObjectStore>,
}

impl<'a> BackupCoordinator<'a> {
    pub fn new(
        config: &'a DeploymentConfig,
        iac: Arc<dyn IacBackend>,
        cluster: Arc<dyn ClusterOps>,
        cloud: Arc<dyn CloudProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            inspector: StateInspector::new(iac.clone()),
            iac,
            cluster,
            cloud,
            store,
        }
    }

    pub async fn run(&self, action: BackupAction) -> Result<BackupResult> {
        if !self.inspector.has_managed_resources().await? {
            info!("No deployment found");
            return Ok(BackupResult::NoDeployment);
        }

        match action {
            BackupAction::Status => Ok(BackupResult::Status(self.status().await)),
            BackupAction::List => {
                let outputs = self.outputs().await?;
                let location = self.blob_location(&outputs)?;
                let artifacts = self
                    .store
                    .list(&location, &self.config.backup.artifact_prefix)
                    .await?;
                Ok(BackupResult::List(artifacts))
            }
            BackupAction::Export => {
                let outputs = self.outputs().await?;
                let artifact = self.export(&outputs, Utc::now()).await?;
                Ok(BackupResult::Exported(artifact))
            }
            BackupAction::Restore(request) => {
                let outputs = self.outputs().await?;
                let result = self.restore(&outputs, request, Utc::now()).await?;
                Ok(BackupResult::Restored(result))
            }
        }
    }

    async fn outputs(&self) -> Result<DeploymentOutputs> {
        let raw = self.iac.outputs().await?;
        Ok(DeploymentOutputs::from_raw(&raw))
    }

    fn blob_location(&self, outputs: &DeploymentOutputs) -> Result<BlobLocation> {
        let account = outputs.storage_account.as_deref().ok_or_else(|| {
            Error::precondition_with_hint(
                "storage account not found in deployment outputs",
                "Run `terrane deploy` so the storage account output is populated",
            )
        })?;
        Ok(BlobLocation::new(account, &self.config.backup.container))
    }

    /// Side-effect free. Individual lookups that fail are left unknown.
    async fn status(&self) -> BackupStatus {
        let outputs = match self.outputs().await {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!(error = %e, "Could not read deployment outputs");
                DeploymentOutputs::default()
            }
        };

        let retention = match outputs.database() {
            Some((resource_group, server)) => {
                match self.cloud.backup_retention(resource_group, server).await {
                    Ok(retention) => Some(retention),
                    Err(e) => {
                        warn!(server, error = %e, "Could not read backup retention");
                        None
                    }
                }
            }
            None => None,
        };

        let artifacts = match self.blob_location(&outputs) {
            Ok(location) => match self
                .store
                .list(&location, &self.config.backup.artifact_prefix)
                .await
            {
                Ok(artifacts) => Some(artifacts),
                Err(e) => {
                    warn!(error = %e, "Could not list backup artifacts");
                    None
                }
            },
            Err(_) => None,
        };

        BackupStatus {
            database_server: outputs.database_server.clone(),
            storage_account: outputs.storage_account.clone(),
            container: self.config.backup.container.clone(),
            retention,
            artifact_count: artifacts.as_ref().map(Vec::len),
            latest_artifact: artifacts.and_then(|a| a.into_iter().next()),
        }
    }

    async fn export(&self, outputs: &DeploymentOutputs, now: DateTime<Utc>) -> Result<BackupArtifact> {
        let backup = &self.config.backup;
        let namespace = self.config.cluster.namespace.as_str();
        let location = self.blob_location(outputs)?;
        let mut pipeline = Pipeline::new(OperationKind::Backup, OperationMode::AutoApproved);

        pipeline
            .fatal("cluster reachable", self.cluster.check_reachable())
            .await?;
        pipeline
            .fatal("connection secret", async {
                if self
                    .cluster
                    .secret_exists(namespace, &backup.database_secret)
                    .await?
                {
                    Ok(())
                } else {
                    Err(Error::precondition_with_hint(
                        format!(
                            "secret {}/{} not found",
                            namespace, backup.database_secret
                        ),
                        "Run `terrane deploy` to recreate the database connection secret",
                    ))
                }
            })
            .await?;

        let job = ExportJob::new(backup, namespace, now);
        let staging = backup.staging_dir().join(&job.artifact);
        info!(job = %job.name, artifact = %job.artifact, "Starting database export");

        let result = self
            .stage_and_upload(&mut pipeline, &job, &staging, &location)
            .await;
        self.cleanup(&job, &staging).await;
        pipeline.finish();
        result
    }

    async fn stage_and_upload(
        &self,
        pipeline: &mut Pipeline,
        job: &ExportJob,
        staging: &Path,
        location: &BlobLocation,
    ) -> Result<BackupArtifact> {
        let backup = &self.config.backup;
        let namespace = job.namespace.as_str();

        pipeline
            .fatal("submit export job", self.cluster.create_job(&job.build(backup)))
            .await?;

        pipeline
            .fatal("wait for export", async {
                match self.cluster.wait_for_job(namespace, &job.name, job.timeout).await? {
                    JobWait::Staged => Ok(()),
                    JobWait::Failed(message) => Err(Error::export_failed(format!(
                        "export job {} failed: {}",
                        job.name, message
                    ))),
                    JobWait::TimedOut => Err(Error::export_failed(format!(
                        "export job {} did not stage an artifact within {}s",
                        job.name,
                        job.timeout.as_secs()
                    ))),
                }
            })
            .await?;

        let size_bytes = pipeline
            .fatal("copy artifact", async {
                let pod = self.cluster.job_pod(namespace, &job.name).await?;
                self.cluster
                    .copy_from_pod(namespace, &pod, ARTIFACT_PATH, staging)
                    .await
                    .map_err(|e| Error::export_failed(format!("copy from {}: {}", pod, e)))?;
                Ok::<_, Error>(tokio::fs::metadata(staging).await?.len())
            })
            .await?;

        pipeline
            .fatal("upload artifact", async {
                self.store
                    .upload(location, &job.artifact, staging)
                    .await
                    .map_err(|e| Error::export_failed(format!("upload of {}: {}", job.artifact, e)))
            })
            .await?;

        info!(artifact = %job.artifact, size_bytes, "Export complete");
        Ok(BackupArtifact {
            location: location.url(&job.artifact),
            name: job.artifact.clone(),
            size_bytes: Some(size_bytes),
            created_at: Some(job.started_at),
        })
    }

    /// Runs after every export attempt. Failures here are logged only.
    async fn cleanup(&self, job: &ExportJob, staging: &Path) {
        if let Err(e) = self.cluster.delete_job(&job.namespace, &job.name).await {
            warn!(job = %job.name, error = %e, "Failed to delete export job");
        }
        match tokio::fs::remove_file(staging).await {
            Ok(()) => debug!(path = %staging.display(), "Removed staging copy"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %staging.display(), error = %e, "Failed to remove staging copy"),
        }
    }

    async fn restore(
        &self,
        outputs: &DeploymentOutputs,
        request: RestoreRequest,
        now: DateTime<Utc>,
    ) -> Result<RestoreResult> {
        let mut pipeline = Pipeline::new(OperationKind::Restore, OperationMode::AutoApproved);
        let result = match request.mode {
            RestoreMode::PointInTime { instant, target } => {
                self.restore_point_in_time(&mut pipeline, outputs, instant, &target, now)
                    .await
            }
            RestoreMode::FromArtifact {
                artifact,
                target_database,
            } => {
                self.restore_instructions(&mut pipeline, outputs, &artifact, target_database.as_deref())
                    .await
            }
        };
        pipeline.finish();
        result
    }

    async fn restore_point_in_time(
        &self,
        pipeline: &mut Pipeline,
        outputs: &DeploymentOutputs,
        instant: DateTime<Utc>,
        target: &str,
        now: DateTime<Utc>,
    ) -> Result<RestoreResult> {
        let (resource_group, source) = outputs.database().ok_or_else(|| {
            Error::precondition("database server not found in deployment outputs")
        })?;
        let target = target.trim();

        let retention = pipeline
            .fatal("read retention", self.cloud.backup_retention(resource_group, source))
            .await?;
        pipeline
            .fatal("validate request", async {
                validate_point_in_time(source, target, instant, &retention, now)
            })
            .await?;

        info!(source, target, instant = %instant, "Restoring into a new server");
        pipeline
            .fatal(
                "restore",
                self.cloud
                    .restore_point_in_time(resource_group, source, target, instant),
            )
            .await?;

        let database_resource = self.config.backup.database_resource.as_str();
        pipeline
            .fatal("verify source", async {
                let resources = self.inspector.list_managed_resources().await?;
                if resources.contains(database_resource) {
                    Ok(())
                } else {
                    Err(Error::backend(
                        "restore verification",
                        format!("{} is no longer tracked after restore", database_resource),
                    ))
                }
            })
            .await?;

        Ok(RestoreResult::Restored {
            source: source.to_string(),
            target: target.to_string(),
            instant,
        })
    }

    async fn restore_instructions(
        &self,
        pipeline: &mut Pipeline,
        outputs: &DeploymentOutputs,
        artifact: &str,
        target_database: Option<&str>,
    ) -> Result<RestoreResult> {
        validate_artifact_name(artifact)?;
        let location = self.blob_location(outputs)?;

        pipeline
            .fatal("locate artifact", async {
                if self.store.exists(&location, artifact).await? {
                    Ok(())
                } else {
                    Err(Error::precondition_with_hint(
                        format!("artifact {} not found in {}", artifact, location.container),
                        "List available artifacts with `terrane backup --list-backups`",
                    ))
                }
            })
            .await?;

        Ok(RestoreResult::Instructions {
            artifact: artifact.to_string(),
            commands: artifact_restore_commands(
                &location,
                artifact,
                outputs.database_fqdn.as_deref(),
                target_database,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockCloud, MockCluster, MockIac};
    use crate::object_store::MockObjectStore;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use terrane_common::iac::{OutputValue, RawOutputs};

    const DB_RESOURCE: &str = "azurerm_postgresql_flexible_server.main";

    fn config(staging: &TempDir) -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.backup.staging_dir = Some(staging.path().to_path_buf());
        config
    }

    fn raw_outputs() -> RawOutputs {
        [
            ("resource_group_name", "rg-prod"),
            ("database_server_name", "pg-prod"),
            ("database_fqdn", "pg-prod.postgres.database.azure.com"),
            ("storage_account_name", "stprod"),
        ]
        .into_iter()
        .map(|(k, v)| {
            (
                k.to_string(),
                OutputValue {
                    sensitive: false,
                    value: serde_json::json!(v),
                },
            )
        })
        .collect()
    }

    fn deployed_iac() -> MockIac {
        let mut iac = MockIac::new();
        iac.expect_state_list().returning(|| {
            Ok(vec![
                "azurerm_resource_group.main".to_string(),
                DB_RESOURCE.to_string(),
            ])
        });
        iac.expect_outputs().returning(|| Ok(raw_outputs()));
        iac
    }

    fn export_ready_cluster() -> MockCluster {
        let mut cluster = MockCluster::new();
        cluster.expect_check_reachable().returning(|| Ok(()));
        cluster.expect_secret_exists().returning(|_, _| Ok(true));
        cluster.expect_create_job().times(1).returning(|_| Ok(()));
        cluster
    }

    fn coordinator<'a>(
        config: &'a DeploymentConfig,
        iac: MockIac,
        cluster: MockCluster,
        cloud: MockCloud,
        store: MockObjectStore,
    ) -> BackupCoordinator<'a> {
        BackupCoordinator::new(
            config,
            Arc::new(iac),
            Arc::new(cluster),
            Arc::new(cloud),
            Arc::new(store),
        )
    }

    fn staged_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn nothing_deployed_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut iac = MockIac::new();
        iac.expect_state_list().returning(|| Ok(vec![]));
        iac.expect_outputs().times(0);

        let result = coordinator(&config, iac, MockCluster::new(), MockCloud::new(), MockObjectStore::new())
            .run(BackupAction::Export)
            .await
            .unwrap();
        assert_eq!(result, BackupResult::NoDeployment);
    }

    #[tokio::test]
    async fn successful_export_uploads_then_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut cluster = export_ready_cluster();
        cluster
            .expect_wait_for_job()
            .returning(|_, _, _| Ok(JobWait::Staged));
        cluster
            .expect_job_pod()
            .returning(|_, _| Ok("terrane-export-abc".to_string()));
        cluster
            .expect_copy_from_pod()
            .withf(|_, _, remote, _| remote == ARTIFACT_PATH)
            .returning(|_, _, _, local| {
                std::fs::write(local, b"\x1f\x8bdump").unwrap();
                Ok(())
            });
        cluster.expect_delete_job().times(1).returning(|_, _| Ok(()));
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .withf(|location, name, _| {
                location.account == "stprod"
                    && name.starts_with("platform_")
                    && name.ends_with(".sql.gz")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();
        let coordinator = coordinator(&config, deployed_iac(), cluster, MockCloud::new(), store);
        let outputs = coordinator.outputs().await.unwrap();
        let artifact = coordinator.export(&outputs, now).await.unwrap();

        assert_eq!(artifact.name, "platform_20240601_020000.sql.gz");
        assert_eq!(artifact.size_bytes, Some(6));
        assert_eq!(staged_files(&dir), 0);
    }

    #[tokio::test]
    async fn job_that_never_stages_is_still_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut cluster = export_ready_cluster();
        cluster
            .expect_wait_for_job()
            .returning(|_, _, _| Ok(JobWait::TimedOut));
        cluster.expect_copy_from_pod().times(0);
        cluster.expect_delete_job().times(1).returning(|_, _| Ok(()));
        let mut store = MockObjectStore::new();
        store.expect_upload().times(0);

        let err = coordinator(&config, deployed_iac(), cluster, MockCloud::new(), store)
            .run(BackupAction::Export)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExportFailed { .. }));
        assert!(err.to_string().contains("did not stage"));
    }

    #[tokio::test]
    async fn failed_job_is_reported_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut cluster = export_ready_cluster();
        cluster
            .expect_wait_for_job()
            .returning(|_, _, _| Ok(JobWait::Failed("BackoffLimitExceeded".to_string())));
        cluster.expect_delete_job().times(1).returning(|_, _| Ok(()));

        let err = coordinator(&config, deployed_iac(), cluster, MockCloud::new(), MockObjectStore::new())
            .run(BackupAction::Export)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BackoffLimitExceeded"));
    }

    #[tokio::test]
    async fn upload_failure_removes_staging_copy_and_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut cluster = export_ready_cluster();
        cluster
            .expect_wait_for_job()
            .returning(|_, _, _| Ok(JobWait::Staged));
        cluster
            .expect_job_pod()
            .returning(|_, _| Ok("terrane-export-abc".to_string()));
        cluster.expect_copy_from_pod().returning(|_, _, _, local| {
            std::fs::write(local, b"dump").unwrap();
            Ok(())
        });
        // cleanup failure must not mask the upload error
        cluster
            .expect_delete_job()
            .times(1)
            .returning(|_, _| Err(Error::cluster("connection reset")));
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .returning(|_, _, _| Err(Error::backend("az storage blob upload", "AuthorizationPermissionMismatch")));

        let err = coordinator(&config, deployed_iac(), cluster, MockCloud::new(), store)
            .run(BackupAction::Export)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExportFailed { .. }));
        assert!(err.to_string().contains("AuthorizationPermissionMismatch"));
        assert_eq!(staged_files(&dir), 0);
    }

    #[tokio::test]
    async fn unreachable_cluster_stops_before_submission() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut cluster = MockCluster::new();
        cluster
            .expect_check_reachable()
            .returning(|| Err(Error::cluster("cluster unreachable: connection refused")));
        cluster.expect_create_job().times(0);
        cluster.expect_delete_job().times(0);

        let err = coordinator(&config, deployed_iac(), cluster, MockCloud::new(), MockObjectStore::new())
            .run(BackupAction::Export)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cluster { .. }));
    }

    #[tokio::test]
    async fn status_reports_unknown_for_failed_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut cloud = MockCloud::new();
        cloud
            .expect_backup_retention()
            .returning(|_, _| Err(Error::backend("az postgres flexible-server show", "throttled")));
        let mut store = MockObjectStore::new();
        store.expect_list().returning(|location, _| {
            Ok(vec![BackupArtifact {
                name: "platform_20240301_120000.sql.gz".to_string(),
                size_bytes: Some(10),
                location: location.url("platform_20240301_120000.sql.gz"),
                created_at: None,
            }])
        });

        let result = coordinator(&config, deployed_iac(), MockCluster::new(), cloud, store)
            .run(BackupAction::Status)
            .await
            .unwrap();
        let BackupResult::Status(status) = result else {
            panic!("expected status, got {:?}", result);
        };
        assert_eq!(status.database_server.as_deref(), Some("pg-prod"));
        assert_eq!(status.retention, None);
        assert_eq!(status.artifact_count, Some(1));
    }

    #[tokio::test]
    async fn point_in_time_restore_creates_new_server_and_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let now = Utc::now();
        let mut cloud = MockCloud::new();
        cloud.expect_backup_retention().returning(move |_, _| {
            Ok(RetentionInfo {
                retention_days: 7,
                geo_redundant: false,
                earliest_restore: Some(now - chrono::Duration::days(7)),
            })
        });
        cloud
            .expect_restore_point_in_time()
            .withf(|rg, source, target, _| rg == "rg-prod" && source == "pg-prod" && target == "pg-prod-restored")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        // deployed_iac has no destroy/state_rm expectations: any call panics
        let instant = now - chrono::Duration::hours(6);

        let result = coordinator(&config, deployed_iac(), MockCluster::new(), cloud, MockObjectStore::new())
            .run(BackupAction::Restore(RestoreRequest::point_in_time(instant, "pg-prod-restored")))
            .await
            .unwrap();

        assert_eq!(
            result,
            BackupResult::Restored(RestoreResult::Restored {
                source: "pg-prod".to_string(),
                target: "pg-prod-restored".to_string(),
                instant,
            })
        );
    }

    #[tokio::test]
    async fn restore_fails_when_source_drops_out_of_state() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let now = Utc::now();

        // deployment gate sees the server; the post-restore read does not
        let reads = Arc::new(AtomicUsize::new(0));
        let mut iac = MockIac::new();
        iac.expect_state_list().returning(move || {
            if reads.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![
                    "azurerm_resource_group.main".to_string(),
                    DB_RESOURCE.to_string(),
                ])
            } else {
                Ok(vec!["azurerm_resource_group.main".to_string()])
            }
        });
        iac.expect_outputs().returning(|| Ok(raw_outputs()));

        let mut cloud = MockCloud::new();
        cloud.expect_backup_retention().returning(move |_, _| {
            Ok(RetentionInfo {
                retention_days: 7,
                geo_redundant: false,
                earliest_restore: Some(now - chrono::Duration::days(7)),
            })
        });
        cloud
            .expect_restore_point_in_time()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let err = coordinator(&config, iac, MockCluster::new(), cloud, MockObjectStore::new())
            .run(BackupAction::Restore(RestoreRequest::point_in_time(
                now - chrono::Duration::hours(6),
                "pg-prod-restored",
            )))
            .await
            .unwrap_err();

        match err {
            Error::Backend { operation, message } => {
                assert_eq!(operation, "restore verification");
                assert!(message.contains(DB_RESOURCE));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn restore_onto_source_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let now = Utc::now();
        let mut cloud = MockCloud::new();
        cloud.expect_backup_retention().returning(|_, _| {
            Ok(RetentionInfo {
                retention_days: 7,
                geo_redundant: false,
                earliest_restore: None,
            })
        });
        cloud.expect_restore_point_in_time().times(0);

        let err = coordinator(&config, deployed_iac(), MockCluster::new(), cloud, MockObjectStore::new())
            .run(BackupAction::Restore(RestoreRequest::point_in_time(
                now - chrono::Duration::hours(1),
                "pg-prod",
            )))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn artifact_restore_returns_commands_without_running_them() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut store = MockObjectStore::new();
        store.expect_exists().returning(|_, _| Ok(true));
        store.expect_upload().times(0);

        let result = coordinator(&config, deployed_iac(), MockCluster::new(), MockCloud::new(), store)
            .run(BackupAction::Restore(RestoreRequest::from_artifact(
                "platform_20240301_120000.sql.gz",
                Some("platform_restore".to_string()),
            )))
            .await
            .unwrap();

        let BackupResult::Restored(RestoreResult::Instructions { commands, .. }) = result else {
            panic!("expected instructions, got {:?}", result);
        };
        assert!(commands[2].contains("host=pg-prod.postgres.database.azure.com"));
    }

    #[tokio::test]
    async fn missing_artifact_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let mut store = MockObjectStore::new();
        store.expect_exists().returning(|_, _| Ok(false));

        let err = coordinator(&config, deployed_iac(), MockCluster::new(), MockCloud::new(), store)
            .run(BackupAction::Restore(RestoreRequest::from_artifact(
                "platform_20990101_000000.sql.gz",
                None,
            )))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition { .. }));
    }
}
