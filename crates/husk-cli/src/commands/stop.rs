//! `husk stop`: Kill a container's process.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;
use husk_runtime::lifecycle::StopOutcome;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container identity or unique prefix.
    pub container: String,
}

/// Executes the `stop` command.
///
/// The record and layers stay until `rm` or `prune`.
///
/// # Errors
///
/// Returns an error if the container cannot be resolved or signalled.
pub fn execute(args: &StopArgs, config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let (record, outcome) = manager
        .stop(&args.container)
        .with_context(|| format!("stopping container {}", args.container))?;
    match outcome {
        StopOutcome::Killed => println!("{}", record.identity),
        StopOutcome::AlreadyExited => println!("{} already exited", record.identity),
    }
    Ok(())
}
