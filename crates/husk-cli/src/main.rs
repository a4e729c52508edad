//! # husk
//!
//! Minimal single-host container runtime: namespaces, an overlay root, and a
//! shared on-disk registry. One binary serves both the user-facing commands
//! and the internal re-entry points used inside new namespaces.

#![allow(clippy::print_stdout)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "husk=info,warn";

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
