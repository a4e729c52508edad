//! `husk attach-child`: Run a command after joining a container's
//! namespaces directly. Used by `exec` when the helper is unavailable.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;
use husk_common::types::ContainerId;

/// Arguments for the `attach-child` command.
#[derive(Args, Debug)]
pub struct AttachChildArgs {
    /// Full container identity.
    pub identity: String,

    /// Command to run inside the container.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `attach-child` command, exiting with the command's code.
///
/// # Errors
///
/// Returns an error if the container is unknown, its root cannot be
/// entered, or the command cannot be run.
pub fn execute(args: AttachChildArgs, config: HuskConfig) -> anyhow::Result<()> {
    let id = ContainerId::parse(&args.identity)
        .with_context(|| format!("invalid container identity {}", args.identity))?;
    let manager = super::open_manager(config)?;
    let code = manager
        .attacher()
        .attach(&id, &args.command)
        .with_context(|| format!("entering container {id}"))?;
    std::process::exit(code);
}
