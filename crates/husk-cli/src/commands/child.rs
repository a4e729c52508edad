//! `husk child`: In-namespace setup of a new container.
//!
//! Invoked by `run` as the first process of the new namespaces; replaces
//! itself with the user command once setup is complete.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use husk_common::config::HuskConfig;
use husk_common::constants;
use husk_common::env::Environment;
use husk_common::types::ContainerId;
use husk_core::namespace::init::{self, InitSpec};
use husk_runtime::state;

/// Arguments for the `child` command.
#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Merged root to change into.
    #[arg(long, env = constants::ENV_ROOTFS, default_value = constants::FALLBACK_ROOTFS)]
    pub rootfs: PathBuf,

    /// Identity used to name the environment snapshot.
    #[arg(long, env = constants::ENV_CONTAINER_ID)]
    pub identity: Option<String>,

    /// Command to exec once setup is done.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `child` command. Only returns on failure.
///
/// # Errors
///
/// Returns an error if any setup step or the final exec fails.
pub fn execute(args: ChildArgs, config: &HuskConfig) -> anyhow::Result<()> {
    // Without an explicit identity the first argument stands in for it.
    let raw_id = args.identity.as_deref().or_else(|| args.command.first().map(String::as_str));
    let snapshot_path = match raw_id.map(ContainerId::parse) {
        Some(Ok(id)) => Some(state::environment_path(&config.state_dir(), &id)),
        _ => {
            tracing::warn!(identity = ?raw_id, "no usable identity, skipping environment snapshot");
            None
        }
    };

    let spec = InitSpec {
        rootfs: args.rootfs,
        hostname: config.hostname.clone(),
        command: args.command,
        inherited: Environment::from_current(),
        snapshot_path,
    };
    let never = init::run(&spec)
        .with_context(|| format!("setting up container root {}", spec.rootfs.display()))?;
    match never {}
}
