//! `husk ps`: List containers.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;

use crate::output;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (including exited).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the registry cannot be read.
pub fn execute(args: &PsArgs, config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let containers = manager.list(args.all).context("listing containers")?;
    print!("{}", output::container_table(&containers));
    Ok(())
}
