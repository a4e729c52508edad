//! `husk rm`: Remove a container's layers and record.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container identity or unique prefix.
    pub container: String,
}

/// Executes the `rm` command.
///
/// Does not check whether the container is still running.
///
/// # Errors
///
/// Returns an error if the container cannot be resolved or its layers
/// cannot be reclaimed.
pub fn execute(args: &RmArgs, config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let id = manager
        .remove(&args.container)
        .with_context(|| format!("removing container {}", args.container))?;
    println!("{id}");
    Ok(())
}
