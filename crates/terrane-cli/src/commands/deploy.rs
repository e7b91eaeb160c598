//! `terrane deploy`: provision or update the platform.

use std::path::Path;

use clap::Args;

use terrane_common::exec::require_tools;
use terrane_common::Result;
use terrane_lifecycle::ApplyEngine;

use super::{load_config, Backends};
use crate::summary;

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct DeployArgs {
    /// Compute and show the plan without applying it
    #[arg(long)]
    pub plan_only: bool,

    /// Apply without asking for confirmation
    #[arg(long)]
    pub auto_approve: bool,
}

impl DeployArgs {
    /// Tools the invocation needs on PATH
    pub fn required_tools(&self) -> &'static [&'static str] {
        if self.plan_only {
            &["terraform"]
        } else {
            &["terraform", "az"]
        }
    }
}

pub async fn run(args: DeployArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_tools(args.required_tools()).await?;

    let backends = Backends::from_config(&config);
    let engine = ApplyEngine::new(
        &config,
        backends.iac,
        backends.cloud,
        backends.cluster,
        backends.confirmer,
    );
    let report = engine.apply(args.auto_approve, args.plan_only).await?;

    println!("{}", summary::render_apply(&report));
    Ok(())
}
