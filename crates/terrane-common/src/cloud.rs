//! Cloud provider control plane (Azure CLI).
//!
//! Cluster credentials, managed database backup metadata and point-in-time
//! restore. Object storage lives with the backup coordinator.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
#[cfg(any(test, feature = "test-util"))]
use mockall::automock;
use serde::Deserialize;
use tracing::info;

use crate::exec::run_checked;
use crate::Result;

/// Backup retention of a managed database server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionInfo {
    pub retention_days: u32,
    pub geo_redundant: bool,
    /// Oldest instant a point-in-time restore can target
    pub earliest_restore: Option<DateTime<Utc>>,
}

impl RetentionInfo {
    /// Whether `instant` lies inside the restorable window ending at `now`
    pub fn covers(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if instant > now {
            return false;
        }
        let earliest = self
            .earliest_restore
            .unwrap_or_else(|| now - chrono::Duration::days(i64::from(self.retention_days)));
        instant >= earliest
    }
}

#[cfg_attr(any(test, feature = "test-util"), automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Merge cluster credentials into the local kubeconfig
    async fn configure_cluster_credentials(&self, resource_group: &str, cluster: &str) -> Result<()>;

    async fn backup_retention(&self, resource_group: &str, server: &str) -> Result<RetentionInfo>;

    /// Create `target` as a new server restored from `source` at `instant`.
    /// The source server is never modified.
    async fn restore_point_in_time(
        &self,
        resource_group: &str,
        source: &str,
        target: &str,
        instant: DateTime<Utc>,
    ) -> Result<()>;
}

pub struct AzureCli {
    kubeconfig: Option<PathBuf>,
}

impl AzureCli {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self { kubeconfig }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerJson {
    #[serde(default)]
    backup: Option<BackupJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupJson {
    #[serde(default)]
    backup_retention_days: Option<u32>,
    #[serde(default)]
    geo_redundant_backup: Option<String>,
    #[serde(default)]
    earliest_restore_date: Option<DateTime<Utc>>,
}

/// Parse `az postgres flexible-server show` output
pub fn parse_retention(json: &str) -> Result<RetentionInfo> {
    let server: ServerJson = serde_json::from_str(json)?;
    let backup = server.backup;
    Ok(RetentionInfo {
        retention_days: backup
            .as_ref()
            .and_then(|b| b.backup_retention_days)
            .unwrap_or(0),
        geo_redundant: backup
            .as_ref()
            .and_then(|b| b.geo_redundant_backup.as_deref())
            .map(|s| s.eq_ignore_ascii_case("enabled"))
            .unwrap_or(false),
        earliest_restore: backup.and_then(|b| b.earliest_restore_date),
    })
}

#[async_trait]
impl CloudProvider for AzureCli {
    async fn configure_cluster_credentials(&self, resource_group: &str, cluster: &str) -> Result<()> {
        let mut args = vec![
            "aks".to_string(),
            "get-credentials".to_string(),
            "--resource-group".to_string(),
            resource_group.to_string(),
            "--name".to_string(),
            cluster.to_string(),
            "--overwrite-existing".to_string(),
        ];
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--file".to_string());
            args.push(kubeconfig.display().to_string());
        }
        run_checked("az aks get-credentials", "az", &args, None).await?;
        info!(cluster, "Cluster credentials configured");
        Ok(())
    }

    async fn backup_retention(&self, resource_group: &str, server: &str) -> Result<RetentionInfo> {
        let json = run_checked(
            "az postgres flexible-server show",
            "az",
            [
                "postgres",
                "flexible-server",
                "show",
                "--resource-group",
                resource_group,
                "--name",
                server,
                "--output",
                "json",
            ],
            None,
        )
        .await?;
        parse_retention(&json)
    }

    async fn restore_point_in_time(
        &self,
        resource_group: &str,
        source: &str,
        target: &str,
        instant: DateTime<Utc>,
    ) -> Result<()> {
        let restore_time = instant.to_rfc3339_opts(SecondsFormat::Secs, true);
        run_checked(
            "az postgres flexible-server restore",
            "az",
            [
                "postgres",
                "flexible-server",
                "restore",
                "--resource-group",
                resource_group,
                "--name",
                target,
                "--source-server",
                source,
                "--restore-time",
                restore_time.as_str(),
            ],
            None,
        )
        .await?;
        info!(source, target, restore_time = %restore_time, "Point-in-time restore completed");
        Ok(())
    }
}
