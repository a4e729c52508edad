//! `husk prune`: Reclaim containers whose process has exited.

use anyhow::Context;
use husk_common::config::HuskConfig;

/// Executes the `prune` command.
///
/// Containers that could not be reclaimed are reported and leave the
/// command failing, after every other container has been handled.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or any reclaim failed.
pub fn execute(config: HuskConfig) -> anyhow::Result<()> {
    let manager = super::open_manager(config)?;
    let report = manager.prune().context("pruning containers")?;
    for id in &report.reclaimed {
        println!("{id}");
    }
    for discarded in &report.unreadable {
        tracing::warn!(id = %discarded.identity, error = %discarded.error, "discarded unreadable record");
        println!("{}", discarded.identity);
    }
    println!(
        "Reclaimed {} container(s)",
        report.reclaimed.len() + report.unreadable.len()
    );
    if let Some(first) = report.anomalies.first() {
        for anomaly in &report.anomalies {
            tracing::error!(id = %anomaly.identity, error = %anomaly.error, "container not reclaimed");
        }
        anyhow::bail!(
            "{} container(s) could not be reclaimed, first: {}: {}",
            report.anomalies.len(),
            first.identity,
            first.error
        );
    }
    Ok(())
}
