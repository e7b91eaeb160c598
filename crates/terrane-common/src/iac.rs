//! IaC backend: the Terraform CLI behind a mockable trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-util"))]
use mockall::automock;
use serde::Deserialize;
use tracing::{debug, info};

use crate::exec::{run_checked, run_streaming, run_tool};
use crate::{Error, Result};

/// Resource counts of a saved plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub add: usize,
    pub change: usize,
    pub destroy: usize,
    /// Addresses with a pending action
    pub addresses: Vec<String>,
}

impl PlanSummary {
    /// Number of resources the plan touches
    pub fn total(&self) -> usize {
        self.add + self.change + self.destroy
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    /// Parse the JSON produced by `terraform show -json <planfile>`.
    pub fn from_plan_json(json: &str) -> Result<Self> {
        let plan: PlanJson = serde_json::from_str(json)?;
        let mut summary = PlanSummary::default();

        for rc in plan.resource_changes {
            let actions: Vec<&str> = rc.change.actions.iter().map(String::as_str).collect();
            let touched = match actions.as_slice() {
                ["create"] => {
                    summary.add += 1;
                    true
                }
                ["update"] => {
                    summary.change += 1;
                    true
                }
                ["delete"] => {
                    summary.destroy += 1;
                    true
                }
                // replacement, either ordering
                ["delete", "create"] | ["create", "delete"] => {
                    summary.add += 1;
                    summary.destroy += 1;
                    true
                }
                _ => false,
            };
            if touched {
                summary.addresses.push(rc.address);
            }
        }

        Ok(summary)
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.add, self.change, self.destroy
        )
    }
}

#[derive(Deserialize)]
struct PlanJson {
    #[serde(default)]
    resource_changes: Vec<ResourceChangeJson>,
}

#[derive(Deserialize)]
struct ResourceChangeJson {
    address: String,
    change: ChangeJson,
}

#[derive(Deserialize)]
struct ChangeJson {
    #[serde(default)]
    actions: Vec<String>,
}

/// One entry of `terraform output -json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputValue {
    #[serde(default)]
    pub sensitive: bool,
    pub value: serde_json::Value,
}

/// Raw output map keyed by output name
pub type RawOutputs = BTreeMap<String, OutputValue>;

/// Operations terrane needs from the IaC backend
#[cfg_attr(any(test, feature = "test-util"), automock)]
#[async_trait]
pub trait IacBackend: Send + Sync {
    /// Initialize the backend connection and providers
    async fn init(&self) -> Result<()>;

    /// Validate the configuration schema
    async fn validate(&self) -> Result<()>;

    /// Compute a plan, save it to `plan_file` and summarize it
    async fn plan(&self, var_file: &Path, plan_file: &str) -> Result<PlanSummary>;

    /// Apply a previously saved plan
    async fn apply(&self, plan_file: &str) -> Result<()>;

    /// Destroy every managed resource
    async fn destroy(&self, var_file: &Path) -> Result<()>;

    /// Read root module outputs
    async fn outputs(&self) -> Result<RawOutputs>;

    /// Addresses of all resources in state
    async fn state_list(&self) -> Result<Vec<String>>;

    /// Stop tracking `address` without deleting the underlying resource
    async fn state_rm(&self, address: &str) -> Result<()>;
}

/// Terraform CLI backend
pub struct Terraform {
    binary: String,
    working_dir: PathBuf,
}

impl Terraform {
    pub fn new(binary: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Terraform runs inside `working_dir`, so a relative path would be
    /// resolved twice.
    fn var_file_arg(var_file: &Path) -> Result<String> {
        let path = std::path::absolute(var_file)?;
        Ok(format!("-var-file={}", path.display()))
    }
}

#[async_trait]
impl IacBackend for Terraform {
    async fn init(&self) -> Result<()> {
        run_checked(
            "terraform init",
            &self.binary,
            ["init", "-input=false", "-no-color"],
            Some(self.working_dir.as_path()),
        )
        .await?;
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        run_checked(
            "terraform validate",
            &self.binary,
            ["validate", "-no-color"],
            Some(self.working_dir.as_path()),
        )
        .await?;
        Ok(())
    }

    async fn plan(&self, var_file: &Path, plan_file: &str) -> Result<PlanSummary> {
        let out_arg = format!("-out={}", plan_file);
        let var_arg = Self::var_file_arg(var_file)?;
        run_streaming(
            "terraform plan",
            &self.binary,
            ["plan", "-input=false", out_arg.as_str(), var_arg.as_str()],
            Some(self.working_dir.as_path()),
        )
        .await?;

        let json = run_checked(
            "terraform show",
            &self.binary,
            ["show", "-json", plan_file],
            Some(self.working_dir.as_path()),
        )
        .await?;
        let summary = PlanSummary::from_plan_json(&json)?;
        info!(plan = %summary, "Plan computed");
        Ok(summary)
    }

    async fn apply(&self, plan_file: &str) -> Result<()> {
        run_streaming(
            "terraform apply",
            &self.binary,
            ["apply", "-input=false", "-auto-approve", plan_file],
            Some(self.working_dir.as_path()),
        )
        .await
    }

    async fn destroy(&self, var_file: &Path) -> Result<()> {
        let var_arg = Self::var_file_arg(var_file)?;
        run_streaming(
            "terraform destroy",
            &self.binary,
            ["destroy", "-input=false", "-auto-approve", var_arg.as_str()],
            Some(self.working_dir.as_path()),
        )
        .await
    }

    async fn outputs(&self) -> Result<RawOutputs> {
        let json = run_checked(
            "terraform output",
            &self.binary,
            ["output", "-json"],
            Some(self.working_dir.as_path()),
        )
        .await?;
        if json.trim().is_empty() {
            return Ok(RawOutputs::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    async fn state_list(&self) -> Result<Vec<String>> {
        let output = run_tool(&self.binary, ["state", "list"], Some(self.working_dir.as_path()))
            .await
            .map_err(|e| Error::backend_unavailable(e.to_string()))?;

        if !output.success {
            let text = output.error_text();
            if text.contains("No state file was found") {
                debug!("No state file, treating as empty");
                return Ok(Vec::new());
            }
            return Err(Error::backend_unavailable(text));
        }

        Ok(parse_state_list(&output.stdout))
    }

    async fn state_rm(&self, address: &str) -> Result<()> {
        run_checked(
            "terraform state rm",
            &self.binary,
            ["state", "rm", address],
            Some(self.working_dir.as_path()),
        )
        .await?;
        Ok(())
    }
}

/// One address per non-empty line
pub fn parse_state_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "format_version": "1.2",
        "resource_changes": [
            {"address": "azurerm_resource_group.main", "change": {"actions": ["no-op"]}},
            {"address": "azurerm_kubernetes_cluster.main", "change": {"actions": ["create"]}},
            {"address": "helm_release.app", "change": {"actions": ["update"]}},
            {"address": "kubernetes_secret.db", "change": {"actions": ["delete", "create"]}},
            {"address": "azurerm_storage_container.old", "change": {"actions": ["delete"]}},
            {"address": "data.azurerm_client_config.current", "change": {"actions": ["read"]}}
        ]
    }"#;

    #[test]
    fn plan_summary_counts_actions() {
        let summary = PlanSummary::from_plan_json(PLAN_JSON).unwrap();
        assert_eq!(summary.add, 2);
        assert_eq!(summary.change, 1);
        assert_eq!(summary.destroy, 2);
        assert_eq!(summary.total(), 5);
        assert_eq!(
            summary.addresses,
            vec![
                "azurerm_kubernetes_cluster.main",
                "helm_release.app",
                "kubernetes_secret.db",
                "azurerm_storage_container.old",
            ]
        );
        assert_eq!(summary.to_string(), "2 to add, 1 to change, 2 to destroy");
    }

    #[test]
    fn plan_without_resource_changes_is_empty() {
        let summary = PlanSummary::from_plan_json(r#"{"format_version": "1.2"}"#).unwrap();
        assert!(!summary.has_changes());
    }

    #[test]
    fn state_list_skips_blank_lines() {
        let parsed = parse_state_list("helm_release.app\n\n  kubernetes_namespace.app \n");
        assert_eq!(parsed, vec!["helm_release.app", "kubernetes_namespace.app"]);
    }

    #[test]
    fn outputs_parse_sensitive_flag() {
        let json = r#"{
            "cluster_name": {"sensitive": false, "type": "string", "value": "aks-prod"},
            "database_password": {"sensitive": true, "type": "string", "value": "hunter2"}
        }"#;
        let outputs: RawOutputs = serde_json::from_str(json).unwrap();
        assert_eq!(outputs["cluster_name"].value, serde_json::json!("aks-prod"));
        assert!(outputs["database_password"].sensitive);
    }

    /// Stand-in `terraform` that exits 3 when `-var-file` does not exist
    /// from its own working directory.
    #[cfg(unix)]
    fn stub_terraform(root: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = root.join("terraform-stub");
        std::fs::write(
            &script,
            r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    -var-file=*) test -f "${arg#-var-file=}" || { echo "missing ${arg#-var-file=}" >&2; exit 3; } ;;
  esac
done
echo '{"resource_changes": []}'
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::path::absolute(&script).unwrap().display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_var_file_resolves_from_terraform_working_dir() {
        use crate::config::IacConfig;

        // relative to the test's cwd, like the default `terraform/` layout
        let root = tempfile::tempdir_in(".").unwrap();
        assert!(root.path().is_relative());
        let working_dir = root.path().join("terraform");
        std::fs::create_dir(&working_dir).unwrap();
        std::fs::write(working_dir.join("terraform.tfvars"), "location = \"westeurope\"\n").unwrap();

        let config = IacConfig {
            working_dir: working_dir.clone(),
            ..IacConfig::default()
        };
        let var_file = config.var_file_path();
        assert!(var_file.is_file());

        let terraform = Terraform::new(stub_terraform(root.path()), working_dir);
        let plan = terraform.plan(&var_file, &config.plan_file).await.unwrap();
        assert!(!plan.has_changes());
        terraform.destroy(&var_file).await.unwrap();
    }

    #[test]
    fn var_file_arg_is_absolute() {
        let arg = Terraform::var_file_arg(Path::new("terraform/terraform.tfvars")).unwrap();
        let path = arg.strip_prefix("-var-file=").unwrap();
        assert!(Path::new(path).is_absolute());
        assert!(path.ends_with("terraform/terraform.tfvars"));
    }
}
