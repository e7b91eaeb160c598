//! Deployment configuration stored in `terrane.yaml`.
//!
//! The file is parsed and validated once at the CLI boundary; every engine
//! receives a `&DeploymentConfig` and never re-reads the file or the
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::PollPolicy;
use crate::{Error, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "terrane.yaml";

/// Upper bound for a single poll interval
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Upper bound for the export job timeout and staging hold
pub const MAX_JOB_SECS: u64 = 24 * 3600;

/// Complete orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    pub iac: IacConfig,
    pub cluster: ClusterConfig,
    pub backup: BackupConfig,
    pub destroy: DestroyConfig,
}

/// IaC backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IacConfig {
    /// Terraform executable
    pub binary: String,
    /// Directory holding the Terraform root module
    pub working_dir: PathBuf,
    /// Variables file produced by `terrane configure`, relative to `working_dir`
    pub var_file: PathBuf,
    /// Saved plan file name, relative to `working_dir`
    pub plan_file: String,
}

impl Default for IacConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            working_dir: PathBuf::from("terraform"),
            var_file: PathBuf::from("terraform.tfvars"),
            plan_file: "tfplan".to_string(),
        }
    }
}

impl IacConfig {
    /// Variables file path as seen from the current directory
    pub fn var_file_path(&self) -> PathBuf {
        if self.var_file.is_absolute() {
            self.var_file.clone()
        } else {
            self.working_dir.join(&self.var_file)
        }
    }
}

/// Polling settings as written in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

impl PollSettings {
    pub const fn new(interval_secs: u64, max_attempts: u32) -> Self {
        Self {
            interval_secs,
            max_attempts,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        PollPolicy::fixed(Duration::from_secs(self.interval_secs), self.max_attempts)
    }
}

/// Cluster-side workload settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// Explicit kubeconfig; falls back to the kube default chain
    pub kubeconfig: Option<PathBuf>,
    /// Namespace the application release is installed into
    pub namespace: String,
    /// Helm release name of the application
    pub release: String,
    /// Label selector matching the application pods
    pub workload_selector: String,
    /// LoadBalancer service exposing the application
    pub service: String,
    pub workload_poll: PollSettings,
    pub external_ip_poll: PollSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            namespace: "platform".to_string(),
            release: "platform".to_string(),
            workload_selector: "app.kubernetes.io/instance=platform".to_string(),
            service: "platform".to_string(),
            workload_poll: PollSettings::new(5, 60),
            external_ip_poll: PollSettings::new(10, 30),
        }
    }
}

/// Backup and restore settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    /// Artifact names are `<prefix>_<YYYYMMDD_HHMMSS>.sql.gz`
    pub artifact_prefix: String,
    /// Object-store container holding artifacts
    pub container: String,
    /// Secret holding the database connection URI
    pub database_secret: String,
    pub database_secret_key: String,
    /// Image providing `pg_dump` and `gzip`
    pub export_image: String,
    /// Hard timeout for the export job to stage its artifact
    pub job_timeout_secs: u64,
    /// How long the export pod keeps the staged artifact available for copy
    pub staging_hold_secs: u64,
    /// IaC address of the managed database server
    pub database_resource: String,
    /// Local directory for staging copies; system temp dir when unset
    pub staging_dir: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            artifact_prefix: "platform".to_string(),
            container: "backups".to_string(),
            database_secret: "platform-database".to_string(),
            database_secret_key: "uri".to_string(),
            export_image: "postgres:16-alpine".to_string(),
            job_timeout_secs: 900,
            staging_hold_secs: 600,
            database_resource: "azurerm_postgresql_flexible_server.main".to_string(),
            staging_dir: None,
        }
    }
}

impl BackupConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Destroy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestroyConfig {
    /// Overrides the built-in stuck resource policy table when set
    pub stuck_resources: Option<Vec<String>>,
    /// Wait for LoadBalancer services to disappear before destroying
    pub load_balancer_poll: PollSettings,
}

impl Default for DestroyConfig {
    fn default() -> Self {
        Self {
            stuck_resources: None,
            load_balancer_poll: PollSettings::new(5, 6),
        }
    }
}

impl DeploymentConfig {
    /// Load and validate the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::precondition_with_hint(
                format!("configuration file {} not found", path.display()),
                "Run `terrane configure` to create it",
            ));
        }
        let data = std::fs::read_to_string(path)?;
        let config: DeploymentConfig =
            serde_yaml::from_str(&data).map_err(|e| Error::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate().map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Write the configuration as YAML.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Structural validation; does not touch the filesystem.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("iac.binary", self.iac.binary.as_str()),
            ("iac.plan_file", self.iac.plan_file.as_str()),
            ("cluster.namespace", self.cluster.namespace.as_str()),
            ("cluster.release", self.cluster.release.as_str()),
            ("cluster.service", self.cluster.service.as_str()),
            ("backup.artifact_prefix", self.backup.artifact_prefix.as_str()),
            ("backup.container", self.backup.container.as_str()),
            ("backup.database_secret", self.backup.database_secret.as_str()),
            ("backup.database_resource", self.backup.database_resource.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{} must not be empty", field)));
            }
        }

        if self
            .backup
            .artifact_prefix
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(Error::validation(
                "backup.artifact_prefix may only contain letters, digits, '-' and '_'",
            ));
        }

        for (field, secs) in [
            ("backup.job_timeout_secs", self.backup.job_timeout_secs),
            ("backup.staging_hold_secs", self.backup.staging_hold_secs),
        ] {
            if secs > MAX_JOB_SECS {
                return Err(Error::validation(format!(
                    "{} must be at most {}",
                    field, MAX_JOB_SECS
                )));
            }
        }
        if self.backup.job_timeout_secs == 0 {
            return Err(Error::validation("backup.job_timeout_secs must be positive"));
        }

        for (field, poll) in [
            ("cluster.workload_poll", self.cluster.workload_poll),
            ("cluster.external_ip_poll", self.cluster.external_ip_poll),
            ("destroy.load_balancer_poll", self.destroy.load_balancer_poll),
        ] {
            if poll.max_attempts == 0 {
                return Err(Error::validation(format!(
                    "{}.max_attempts must be positive",
                    field
                )));
            }
            if poll.interval_secs > MAX_POLL_INTERVAL_SECS {
                return Err(Error::validation(format!(
                    "{}.interval_secs must be at most {}",
                    field, MAX_POLL_INTERVAL_SECS
                )));
            }
        }

        Ok(())
    }
}
