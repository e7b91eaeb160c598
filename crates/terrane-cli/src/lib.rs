//! terrane CLI library

pub mod commands;
pub mod summary;
pub mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use terrane_common::config::DEFAULT_CONFIG_FILE;
use terrane_common::Result;

/// terrane - infrastructure lifecycle and backup/restore orchestrator
#[derive(Parser, Debug)]
#[command(name = "terrane")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, env = "TERRANE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision or update the platform
    Deploy(commands::deploy::DeployArgs),
    /// Tear down every managed resource
    Destroy(commands::destroy::DestroyArgs),
    /// Backup status, export, listing and restore
    Backup(commands::backup::BackupArgs),
    /// Create or update the configuration file
    Configure,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Deploy(args) => commands::deploy::run(args, &self.config).await,
            Commands::Destroy(args) => commands::destroy::run(args, &self.config).await,
            Commands::Backup(args) => commands::backup::run(args, &self.config).await,
            Commands::Configure => commands::configure::run(&self.config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_working_directory_file() {
        let cli = Cli::try_parse_from(["terrane", "deploy", "--plan-only"]).expect("parse");
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        match cli.command {
            Commands::Deploy(args) => {
                assert!(args.plan_only);
                assert!(!args.auto_approve);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from([
            "terrane",
            "destroy",
            "--force",
            "--config",
            "/tmp/other.yaml",
        ])
        .expect("parse");
        assert_eq!(cli.config, PathBuf::from("/tmp/other.yaml"));
        match cli.command {
            Commands::Destroy(args) => assert!(args.force && !args.auto_approve),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn deploy_plan_only_needs_only_terraform() {
        let cli = Cli::try_parse_from(["terrane", "deploy", "--plan-only"]).expect("parse");
        let Commands::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.required_tools(), &["terraform"]);
    }
}
