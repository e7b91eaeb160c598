//! `terrane backup`: status, export, listing and restore.

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::Args;

use terrane_backup::{BackupAction, BackupCoordinator, BackupResult, RestoreRequest};
use terrane_common::exec::require_tools;
use terrane_common::{Error, Result};

use super::{load_config, Backends};
use crate::summary;

#[derive(Args, Debug, Clone, Default)]
pub struct BackupArgs {
    /// Export a logical dump of the database to blob storage
    #[arg(long, conflicts_with_all = ["list_backups", "restore"])]
    pub export_to_blob: bool,

    /// List exported backup artifacts, newest first
    #[arg(long, conflicts_with = "restore")]
    pub list_backups: bool,

    /// Restore the database (point-in-time or from an artifact)
    #[arg(long)]
    pub restore: bool,

    /// Instant to restore to, RFC 3339 (e.g. 2026-10-15T08:00:00Z)
    #[arg(long, requires = "restore", value_parser = parse_instant)]
    pub point_in_time: Option<DateTime<Utc>>,

    /// Name of the new server created by a point-in-time restore
    #[arg(long, requires = "point_in_time")]
    pub target: Option<String>,

    /// Exported artifact to restore from
    #[arg(long, requires = "restore", conflicts_with = "point_in_time")]
    pub from_artifact: Option<String>,

    /// Database the artifact should be loaded into
    #[arg(long, requires = "from_artifact")]
    pub target_database: Option<String>,
}

fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

impl BackupArgs {
    /// Resolve the flags into one coordinator action.
    pub fn action(&self) -> Result<BackupAction> {
        if self.export_to_blob {
            return Ok(BackupAction::Export);
        }
        if self.list_backups {
            return Ok(BackupAction::List);
        }
        if !self.restore {
            return Ok(BackupAction::Status);
        }

        match (&self.point_in_time, &self.target, &self.from_artifact) {
            (Some(instant), Some(target), None) => Ok(BackupAction::Restore(
                RestoreRequest::point_in_time(*instant, target.clone()),
            )),
            (Some(_), None, None) => Err(Error::validation(
                "--point-in-time requires --target naming the new server",
            )),
            (None, _, Some(artifact)) => Ok(BackupAction::Restore(RestoreRequest::from_artifact(
                artifact.clone(),
                self.target_database.clone(),
            ))),
            _ => Err(Error::validation(
                "--restore requires either --point-in-time with --target, or --from-artifact",
            )),
        }
    }

    fn required_tools(&self, action: &BackupAction) -> &'static [&'static str] {
        match action {
            BackupAction::Export => &["terraform", "az", "kubectl"],
            _ => &["terraform", "az"],
        }
    }
}

pub async fn run(args: BackupArgs, config_path: &Path) -> Result<()> {
    let action = args.action()?;
    let config = load_config(config_path)?;
    require_tools(args.required_tools(&action)).await?;

    let backends = Backends::from_config(&config);
    let coordinator = BackupCoordinator::new(
        &config,
        backends.iac,
        backends.cluster,
        backends.cloud,
        backends.store,
    );

    let now = Utc::now();
    match coordinator.run(action).await? {
        BackupResult::NoDeployment => println!("No deployment found."),
        BackupResult::Status(status) => {
            println!("{}", summary::render_backup_status(&status, now))
        }
        BackupResult::List(artifacts) => {
            println!("{}", summary::render_artifacts(&artifacts, now))
        }
        BackupResult::Exported(artifact) => println!("{}", summary::render_exported(&artifact)),
        BackupResult::Restored(result) => println!("{}", summary::render_restore(&result)),
    }
    Ok(())
}
