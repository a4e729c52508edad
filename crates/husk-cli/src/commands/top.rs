//! `husk top`: List the processes of a running container.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;
use husk_runtime::top::list_container_processes;

use crate::output;

/// Arguments for the `top` command.
#[derive(Args, Debug)]
pub struct TopArgs {
    /// Container identity or unique prefix.
    pub container: String,
}

/// Executes the `top` command.
///
/// # Errors
///
/// Returns an error if the container cannot be resolved or is not running.
pub fn execute(args: &TopArgs, config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let record = manager
        .resolve(&args.container)
        .with_context(|| format!("looking up container {}", args.container))?;
    let rows = list_container_processes(manager.procs(), &record)
        .with_context(|| format!("listing processes of {}", record.identity))?;
    print!("{}", output::process_table(&rows));
    Ok(())
}
