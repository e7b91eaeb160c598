//! `terrane configure`: interactive setup of `terrane.yaml`.

use std::path::{Path, PathBuf};

use dialoguer::Input;
use tracing::info;

use terrane_common::config::DeploymentConfig;
use terrane_common::{Error, Result};

/// Prompt for the main settings, starting from the existing file if any.
pub async fn run(config_path: &Path) -> Result<()> {
    let mut config = if config_path.exists() {
        DeploymentConfig::load(config_path)?
    } else {
        DeploymentConfig::default()
    };

    config.iac.working_dir = PathBuf::from(prompt(
        "Terraform directory",
        &config.iac.working_dir.display().to_string(),
    )?);
    config.iac.var_file = PathBuf::from(prompt(
        "Variables file",
        &config.iac.var_file.display().to_string(),
    )?);
    config.cluster.namespace = prompt("Platform namespace", &config.cluster.namespace)?;
    config.cluster.release = prompt("Helm release", &config.cluster.release)?;
    config.backup.artifact_prefix = prompt("Backup artifact prefix", &config.backup.artifact_prefix)?;
    config.backup.container = prompt("Backup container", &config.backup.container)?;

    config.save(config_path)?;
    info!(path = %config_path.display(), "Configuration saved");

    if !config.iac.var_file_path().exists() {
        println!(
            "Create {} with your Terraform variables before running `terrane deploy`.",
            config.iac.var_file_path().display()
        );
    }
    Ok(())
}

fn prompt(label: &str, default: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(label)
        .default(default.to_string())
        .interact_text()
        .map_err(|e| Error::precondition(format!("prompt failed: {}", e)))
}
