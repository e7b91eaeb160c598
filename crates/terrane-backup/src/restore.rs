//! Restore requests and their validation.
//!
//! Both paths create something new: a point-in-time restore provisions a new
//! server next to the source; an artifact restore only produces the commands
//! for the operator to run against a database of their choosing.

use chrono::{DateTime, SecondsFormat, Utc};

use terrane_common::cloud::RetentionInfo;
use terrane_common::{Error, Result};

use crate::object_store::{BlobLocation, ARTIFACT_SUFFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreMode {
    /// Provider-side restore into a new server named `target`
    PointInTime {
        instant: DateTime<Utc>,
        target: String,
    },
    /// Manual restore of a stored artifact
    FromArtifact {
        artifact: String,
        target_database: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub mode: RestoreMode,
}

impl RestoreRequest {
    pub fn point_in_time(instant: DateTime<Utc>, target: impl Into<String>) -> Self {
        Self {
            mode: RestoreMode::PointInTime {
                instant,
                target: target.into(),
            },
        }
    }

    pub fn from_artifact(artifact: impl Into<String>, target_database: Option<String>) -> Self {
        Self {
            mode: RestoreMode::FromArtifact {
                artifact: artifact.into(),
                target_database,
            },
        }
    }
}

/// What a restore produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreResult {
    Restored {
        source: String,
        target: String,
        instant: DateTime<Utc>,
    },
    /// Commands to run by hand; nothing was executed
    Instructions {
        artifact: String,
        commands: Vec<String>,
    },
}

/// Reject targets that would touch the source and instants outside the window.
pub fn validate_point_in_time(
    source: &str,
    target: &str,
    instant: DateTime<Utc>,
    retention: &RetentionInfo,
    now: DateTime<Utc>,
) -> Result<()> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::validation("restore target name must not be empty"));
    }
    if target == source {
        return Err(Error::validation(format!(
            "restore target {} is the source server; restores always create a new server",
            target
        )));
    }
    if !retention.covers(instant, now) {
        let earliest = retention
            .earliest_restore
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| format!("{} days ago", retention.retention_days));
        return Err(Error::validation(format!(
            "{} is outside the restore window (earliest {}, latest now)",
            instant.to_rfc3339_opts(SecondsFormat::Secs, true),
            earliest
        )));
    }
    Ok(())
}

/// Download, decompress and load commands for an artifact.
pub fn artifact_restore_commands(
    location: &BlobLocation,
    artifact: &str,
    database_host: Option<&str>,
    target_database: Option<&str>,
) -> Vec<String> {
    let sql_file = artifact.strip_suffix(".gz").unwrap_or(artifact);
    let host = database_host.unwrap_or("<database-host>");
    let database = target_database.unwrap_or("<target-database>");
    vec![
        format!(
            "az storage blob download --account-name {} --container-name {} --name {} --file {} --auth-mode login",
            location.account, location.container, artifact, artifact
        ),
        format!("gunzip {}", artifact),
        format!(
            "psql \"host={} dbname={} sslmode=require\" --single-transaction -f {}",
            host, database, sql_file
        ),
    ]
}

/// Artifact names must look like something the exporter produced
pub fn validate_artifact_name(artifact: &str) -> Result<()> {
    if artifact.is_empty() || artifact.contains('/') || !artifact.ends_with(ARTIFACT_SUFFIX) {
        return Err(Error::validation(format!(
            "{:?} is not a backup artifact name (expected <prefix>_<YYYYMMDD_HHMMSS>{})",
            artifact, ARTIFACT_SUFFIX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn retention() -> RetentionInfo {
        RetentionInfo {
            retention_days: 7,
            geo_redundant: false,
            earliest_restore: Some(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn valid_request_passes() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 8, 14, 0, 0).unwrap();
        validate_point_in_time("pg-prod", "pg-prod-restored", instant, &retention(), now()).unwrap();
    }

    #[rstest]
    #[case("pg-prod")]
    #[case(" pg-prod ")]
    #[case("")]
    fn target_must_be_new(#[case] target: &str) {
        let instant = Utc.with_ymd_and_hms(2024, 5, 8, 14, 0, 0).unwrap();
        let err = validate_point_in_time("pg-prod", target, instant, &retention(), now()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn instant_before_window_is_rejected() {
        let instant = Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap();
        let err = validate_point_in_time("pg-prod", "pg-new", instant, &retention(), now()).unwrap_err();
        assert!(err.to_string().contains("outside the restore window"));
    }

    #[test]
    fn artifact_commands_download_decompress_and_load() {
        let location = BlobLocation::new("stprod", "backups");
        let commands = artifact_restore_commands(
            &location,
            "platform_20240301_120000.sql.gz",
            Some("pg-prod.postgres.database.azure.com"),
            Some("platform_restore"),
        );
        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("az storage blob download --account-name stprod"));
        assert_eq!(commands[1], "gunzip platform_20240301_120000.sql.gz");
        assert!(commands[2].contains("dbname=platform_restore"));
        assert!(commands[2].ends_with("-f platform_20240301_120000.sql"));
    }

    #[test]
    fn unknown_host_is_a_placeholder() {
        let location = BlobLocation::new("stprod", "backups");
        let commands = artifact_restore_commands(&location, "p_20240301_120000.sql.gz", None, None);
        assert!(commands[2].contains("host=<database-host>"));
    }

    #[rstest]
    #[case("platform_20240301_120000.sql.gz", true)]
    #[case("../etc/passwd.sql.gz", false)]
    #[case("platform.tar", false)]
    #[case("", false)]
    fn artifact_names(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(validate_artifact_name(name).is_ok(), ok);
    }
}
