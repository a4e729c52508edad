//! `husk exec`: Run a command inside a running container.

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;
use husk_runtime::exec::EntryPath;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container identity or unique prefix.
    pub container: String,

    /// Command to execute.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// Standard streams are connected straight through; the process exits
/// with the command's exit code.
///
/// # Errors
///
/// Returns an error if the container cannot be resolved, is not running,
/// or cannot be entered.
pub fn execute(args: ExecArgs, config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let code = manager
        .attacher()
        .exec(&args.container, &args.command, &EntryPath::from_env())
        .with_context(|| format!("exec in container {}", args.container))?;
    std::process::exit(code);
}
