//! Subprocess helpers for the external CLIs terrane drives.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Most useful error text: stderr, or stdout when stderr is empty
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program` with `args` and capture its output.
///
/// A non-zero exit is returned as `ToolOutput { success: false, .. }`; only a
/// failure to spawn is an error.
pub async fn run_tool<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!(program, "Running command");

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::precondition_with_hint(format!("{} not found", program), install_hint(program))
        } else {
            Error::Io(e)
        }
    })?;

    Ok(ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command and require a zero exit; `operation` names it in the error.
pub async fn run_checked<I, S>(
    operation: &str,
    program: &str,
    args: I,
    cwd: Option<&Path>,
) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_tool(program, args, cwd).await?;
    if !output.success {
        return Err(Error::backend(operation, output.error_text()));
    }
    Ok(output.stdout)
}

/// Run a command with inherited stdio so the operator sees its progress.
pub async fn run_streaming<I, S>(
    operation: &str,
    program: &str,
    args: I,
    cwd: Option<&Path>,
) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let status = cmd.status().await?;
    if !status.success() {
        return Err(Error::backend(
            operation,
            format!("{} exited with {}", program, status),
        ));
    }
    Ok(())
}

/// Check whether a tool is on PATH
pub async fn tool_available(tool: &str) -> bool {
    Command::new("which")
        .arg(tool)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Fail with an install hint for the first missing tool.
pub async fn require_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        if !tool_available(tool).await {
            return Err(Error::precondition_with_hint(
                format!("{} not found", tool),
                install_hint(tool),
            ));
        }
    }
    Ok(())
}

fn install_hint(tool: &str) -> String {
    match tool {
        "terraform" => "Install Terraform: https://developer.hashicorp.com/terraform/install".into(),
        "kubectl" => "Install kubectl: https://kubernetes.io/docs/tasks/tools/".into(),
        "helm" => "Install Helm: https://helm.sh/docs/intro/install/".into(),
        "az" => "Install the Azure CLI and run `az login`: https://learn.microsoft.com/cli/azure/install-azure-cli".into(),
        other => format!("Install {} and make sure it is on PATH", other),
    }
}
