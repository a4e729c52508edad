//! CLI command definitions and dispatch.

pub mod attach_child;
pub mod child;
pub mod exec;
pub mod prune;
pub mod ps;
pub mod rm;
pub mod run;
pub mod stop;
pub mod top;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use husk_common::config::HuskConfig;
use husk_common::constants;
use husk_runtime::lifecycle::LifecycleManager;

/// husk: minimal single-host container runtime.
#[derive(Parser, Debug)]
#[command(name = "husk", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding container records and layer sets.
    #[arg(long, global = true, env = constants::ENV_DATA_DIR, default_value = constants::DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Directory holding `manifest.json` and the layer archives it lists.
    #[arg(long, global = true, env = constants::ENV_IMAGE_DIR, default_value = constants::DEFAULT_IMAGE_DIR)]
    pub image_dir: PathBuf,
}

impl Cli {
    /// Runtime configuration from the global flags.
    #[must_use]
    pub fn config(&self) -> HuskConfig {
        HuskConfig::new(&self.data_dir, &self.image_dir)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a command in a new container built from an image.
    Run(run::RunArgs),
    /// Set up a new container from inside its namespaces (internal).
    #[command(hide = true)]
    Child(child::ChildArgs),
    /// Join a running container's namespaces and run a command (internal).
    #[command(hide = true, name = "attach-child")]
    AttachChild(attach_child::AttachChildArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Remove every container whose process has exited.
    Prune,
    /// List the processes of a running container.
    Top(top::TopArgs),
    /// Run a command inside a running container.
    Exec(exec::ExecArgs),
    /// Kill a container's process.
    Stop(stop::StopArgs),
    /// Remove a container's layers and record.
    Rm(rm::RmArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Child(args) => child::execute(args, &config),
        Command::AttachChild(args) => attach_child::execute(args, config),
        Command::Ps(args) => ps::execute(&args, config),
        Command::Prune => prune::execute(config),
        Command::Top(args) => top::execute(&args, config),
        Command::Exec(args) => exec::execute(args, config),
        Command::Stop(args) => stop::execute(&args, config),
        Command::Rm(args) => rm::execute(&args, config),
    }
}

/// Opens the lifecycle manager over the configured data directory.
///
/// # Errors
///
/// Returns an error if the registry cannot be opened.
pub fn open_manager(config: HuskConfig) -> anyhow::Result<LifecycleManager> {
    let data_dir = config.data_dir.clone();
    LifecycleManager::open(config)
        .with_context(|| format!("opening container registry under {}", data_dir.display()))
}
