//! Error types shared by every terrane crate
//!
//! Variants follow the orchestrator's failure taxonomy: precondition failures
//! are raised before anything is mutated, backend failures carry the backend's
//! own output verbatim, and cleanup failures never reach this type at all (they
//! are logged where they happen).

use std::path::PathBuf;

/// Terrane Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of a failure, used for the CLI diagnostic header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Precondition,
    Backend,
    Cluster,
    Configuration,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Precondition => "PRECONDITION",
            ErrorCategory::Backend => "BACKEND",
            ErrorCategory::Cluster => "CLUSTER",
            ErrorCategory::Configuration => "CONFIGURATION",
            ErrorCategory::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Terrane errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing tool, missing configuration, not authenticated
    #[error("precondition failed: {message}")]
    Precondition {
        message: String,
        remediation: Option<String>,
    },

    /// The IaC state store could not be read
    #[error("state backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// An external backend command failed; `message` is its own output
    #[error("{operation} failed: {message}")]
    Backend { operation: String, message: String },

    /// Destroy failed and no automated recovery was requested
    #[error("destroy failed: {message}")]
    DestroyFailed { message: String },

    /// Database export did not produce an uploaded artifact
    #[error("export failed: {message}")]
    ExportFailed { message: String },

    #[error("cluster error: {message}")]
    Cluster { message: String },

    #[error("invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition {
            message: message.into(),
            remediation: None,
        }
    }

    pub fn precondition_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Precondition {
            message: message.into(),
            remediation: Some(hint.into()),
        }
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            message: message.into(),
        }
    }

    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn destroy_failed(message: impl Into<String>) -> Self {
        Error::DestroyFailed {
            message: message.into(),
        }
    }

    pub fn export_failed(message: impl Into<String>) -> Self {
        Error::ExportFailed {
            message: message.into(),
        }
    }

    pub fn cluster(message: impl Into<String>) -> Self {
        Error::Cluster {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Precondition { .. } => ErrorCategory::Precondition,
            Error::BackendUnavailable { .. }
            | Error::Backend { .. }
            | Error::DestroyFailed { .. }
            | Error::ExportFailed { .. } => ErrorCategory::Backend,
            Error::Kube(_) | Error::Cluster { .. } => ErrorCategory::Cluster,
            Error::Config { .. } | Error::Validation { .. } | Error::Yaml(_) => {
                ErrorCategory::Configuration
            }
            Error::Io(_) | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    /// Suggested command or action for the operator, if one applies
    pub fn remediation(&self) -> Option<String> {
        match self {
            Error::Precondition { remediation, .. } => remediation.clone(),
            Error::BackendUnavailable { .. } => Some(
                "Check backend credentials and run `terraform init` in the IaC directory"
                    .to_string(),
            ),
            Error::DestroyFailed { .. } => Some(
                "Retry with `terrane destroy --force` to detach known stuck resources".to_string(),
            ),
            Error::ExportFailed { .. } => Some(
                "Inspect the cluster with `kubectl get jobs,pods -n <namespace>` and retry `terrane backup --export-to-blob`"
                    .to_string(),
            ),
            Error::Kube(_) | Error::Cluster { .. } => {
                Some("Refresh cluster credentials with `terrane deploy --plan-only` or `az aks get-credentials`".to_string())
            }
            Error::Config { .. } => Some("Run `terrane configure` to regenerate the configuration".to_string()),
            _ => None,
        }
    }
}

/// Extension trait to convert errors with Display into a backend error.
///
/// Shortens the common `.map_err(|e| Error::backend(op, e.to_string()))`.
pub trait BackendErrorExt<T> {
    fn backend_err(self, operation: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> BackendErrorExt<T> for std::result::Result<T, E> {
    fn backend_err(self, operation: &str) -> Result<T> {
        self.map_err(|e| Error::backend(operation, e.to_string()))
    }
}
