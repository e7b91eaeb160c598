//! Object storage for backup artifacts (Azure Blob via the Azure CLI).

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tracing::info;

use terrane_common::exec::run_checked;
use terrane_common::Result;

/// Suffix of every exported artifact
pub const ARTIFACT_SUFFIX: &str = ".sql.gz";

/// `<prefix>_<YYYYMMDD_HHMMSS>.sql.gz`, timestamp in UTC
pub fn artifact_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}{}", prefix, at.format("%Y%m%d_%H%M%S"), ARTIFACT_SUFFIX)
}

/// Storage account and container holding artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub account: String,
    pub container: String,
}

impl BlobLocation {
    pub fn new(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account, self.container, name
        )
    }
}

/// A stored export. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub location: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file; never overwrites an existing artifact
    async fn upload(&self, location: &BlobLocation, name: &str, file: &Path) -> Result<()>;

    /// Artifacts whose name starts with `prefix`, newest first
    async fn list(&self, location: &BlobLocation, prefix: &str) -> Result<Vec<BackupArtifact>>;

    async fn exists(&self, location: &BlobLocation, name: &str) -> Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AzureBlobStore;

#[derive(Deserialize)]
struct BlobJson {
    name: String,
    #[serde(default)]
    properties: Option<BlobPropertiesJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobPropertiesJson {
    #[serde(default)]
    content_length: Option<u64>,
    #[serde(default)]
    creation_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ExistsJson {
    exists: bool,
}

/// Parse `az storage blob list` output into artifacts, newest first
pub fn parse_blob_list(json: &str, location: &BlobLocation) -> Result<Vec<BackupArtifact>> {
    let blobs: Vec<BlobJson> = serde_json::from_str(json)?;
    let mut artifacts: Vec<BackupArtifact> = blobs
        .into_iter()
        .filter(|b| b.name.ends_with(ARTIFACT_SUFFIX))
        .map(|b| {
            let (size_bytes, created_at) = b
                .properties
                .map(|p| (p.content_length, p.creation_time))
                .unwrap_or((None, None));
            BackupArtifact {
                location: location.url(&b.name),
                name: b.name,
                size_bytes,
                created_at,
            }
        })
        .collect();
    // timestamped names sort chronologically
    artifacts.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(artifacts)
}

fn location_args<'a>(location: &'a BlobLocation) -> [&'a str; 6] {
    [
        "--account-name",
        location.account.as_str(),
        "--container-name",
        location.container.as_str(),
        "--auth-mode",
        "login",
    ]
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn upload(&self, location: &BlobLocation, name: &str, file: &Path) -> Result<()> {
        let file = file.display().to_string();
        let mut args = vec!["storage", "blob", "upload"];
        args.extend(location_args(location));
        args.extend(["--name", name, "--file", file.as_str(), "--no-progress"]);
        run_checked("az storage blob upload", "az", &args, None).await?;
        info!(artifact = name, container = %location.container, "Artifact uploaded");
        Ok(())
    }

    async fn list(&self, location: &BlobLocation, prefix: &str) -> Result<Vec<BackupArtifact>> {
        let mut args = vec!["storage", "blob", "list"];
        args.extend(location_args(location));
        args.extend(["--prefix", prefix, "--output", "json"]);
        let json = run_checked("az storage blob list", "az", &args, None).await?;
        parse_blob_list(&json, location)
    }

    async fn exists(&self, location: &BlobLocation, name: &str) -> Result<bool> {
        let mut args = vec!["storage", "blob", "exists"];
        args.extend(location_args(location));
        args.extend(["--name", name, "--output", "json"]);
        let json = run_checked("az storage blob exists", "az", &args, None).await?;
        let parsed: ExistsJson = serde_json::from_str(&json)?;
        Ok(parsed.exists)
    }
}
