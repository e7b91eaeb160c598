//! Export job construction
//!
//! Builds the one-shot Kubernetes Job that dumps the managed database into
//! an `emptyDir`. The container streams `pg_dump | gzip`, marks itself ready
//! once the artifact is complete, then holds so the artifact can be copied
//! out. The coordinator deletes the Job as soon as the copy is done.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, ExecAction, PodSpec, PodTemplateSpec,
    Probe, SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use terrane_common::config::BackupConfig;

use crate::object_store::artifact_name;

/// Mount point of the staging volume inside the export container
const STAGING_PATH: &str = "/staging";
/// Path of the finished artifact inside the export container
pub const ARTIFACT_PATH: &str = "/staging/export.sql.gz";
const READY_MARKER: &str = "/staging/.ready";

/// Seconds a finished Job lingers if the coordinator could not delete it
const TTL_AFTER_FINISHED: i32 = 300;

/// One export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub name: String,
    pub namespace: String,
    /// Object-store name the artifact is uploaded under
    pub artifact: String,
    pub timeout: Duration,
    pub started_at: DateTime<Utc>,
}

impl ExportJob {
    pub fn new(config: &BackupConfig, namespace: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: export_job_name(now),
            namespace: namespace.to_string(),
            artifact: artifact_name(&config.artifact_prefix, now),
            timeout: config.job_timeout(),
            started_at: now,
        }
    }

    /// Build the Kubernetes Job.
    ///
    /// - `backoffLimit: 0`: a failed dump is reported, not retried
    /// - `activeDeadlineSeconds` covers the dump plus the staging hold
    /// - `ttlSecondsAfterFinished` as a backstop for missed cleanup
    pub fn build(&self, config: &BackupConfig) -> Job {
        let mut labels = BTreeMap::new();
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            "terrane".to_string(),
        );
        labels.insert(
            "app.kubernetes.io/component".to_string(),
            "database-export".to_string(),
        );

        let container = Container {
            name: "export".to_string(),
            image: Some(config.export_image.clone()),
            command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            args: Some(vec![export_script(config.staging_hold_secs)]),
            env: Some(vec![EnvVar {
                name: "DATABASE_URL".to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: config.database_secret.clone(),
                        key: config.database_secret_key.clone(),
                        optional: Some(false),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            readiness_probe: Some(Probe {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "test".to_string(),
                        "-f".to_string(),
                        READY_MARKER.to_string(),
                    ]),
                }),
                period_seconds: Some(2),
                ..Default::default()
            }),
            volume_mounts: Some(vec![VolumeMount {
                name: "staging".to_string(),
                mount_path: STAGING_PATH.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let volume = Volume {
            name: "staging".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        };

        let deadline = config.job_timeout_secs.saturating_add(config.staging_hold_secs);

        Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(0),
                active_deadline_seconds: Some(i64::try_from(deadline).unwrap_or(i64::MAX)),
                ttl_seconds_after_finished: Some(TTL_AFTER_FINISHED),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        volumes: Some(vec![volume]),
                        restart_policy: Some("Never".to_string()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// DNS-safe job name derived from the start time
pub fn export_job_name(now: DateTime<Utc>) -> String {
    format!("terrane-export-{}", now.format("%Y%m%d-%H%M%S"))
}

fn export_script(hold_secs: u64) -> String {
    format!(
        "set -euo pipefail\n\
         pg_dump --no-owner --no-privileges \"$DATABASE_URL\" | gzip > {artifact}.partial\n\
         mv {artifact}.partial {artifact}\n\
         touch {marker}\n\
         sleep {hold}\n",
        artifact = ARTIFACT_PATH,
        marker = READY_MARKER,
        hold = hold_secs,
    )
}
