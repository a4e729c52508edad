//! `husk run`: Start a command in a new container.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;
use husk_runtime::lifecycle::StartMode;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Leave the container running in the background.
    #[arg(short, long)]
    pub daemon: bool,

    /// Image tag to look up in the manifest, e.g. `alpine:latest`.
    pub image: String,

    /// Command to run as the container's init process.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// Interactive runs exit with the container's exit code.
///
/// # Errors
///
/// Returns an error if the image cannot be found or the container cannot
/// be started.
pub fn execute(args: RunArgs, config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let mode = if args.daemon {
        StartMode::Background
    } else {
        StartMode::Interactive
    };
    let outcome = manager
        .start(&args.image, &args.command, mode)
        .with_context(|| format!("starting {} from image {}", args.command.join(" "), args.image))?;

    if let Some(exit) = outcome.exit {
        std::process::exit(exit.code());
    }
    let id = &outcome.record.identity;
    println!("{id}");
    println!("Attach with: husk exec {id} /bin/sh");
    Ok(())
}
