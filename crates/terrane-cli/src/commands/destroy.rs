//! `terrane destroy`: tear down every managed resource.

use std::path::Path;

use clap::Args;

use terrane_common::exec::require_tools;
use terrane_common::pipeline::Outcome;
use terrane_common::Result;
use terrane_lifecycle::DestroyEngine;

use super::{load_config, Backends};
use crate::{summary, ui};

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct DestroyArgs {
    /// Destroy without the typed confirmation
    #[arg(long)]
    pub auto_approve: bool,

    /// On failure, detach known stuck resources from state and retry once
    #[arg(long)]
    pub force: bool,
}

pub async fn run(args: DestroyArgs, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_tools(&["terraform", "helm"]).await?;

    let backends = Backends::from_config(&config);
    let engine = DestroyEngine::new(
        &config,
        backends.iac,
        backends.cluster,
        backends.helm,
        backends.confirmer,
    );
    let report = engine.destroy(args.auto_approve, args.force).await?;

    println!("{}", summary::render_destroy(&report));
    if args.force && report.operation.outcome == Outcome::Partial {
        ui::print_warning("best-effort destroy did not complete cleanly; review the resources listed above");
    }
    Ok(())
}
