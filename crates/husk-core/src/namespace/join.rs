//! Joining the namespaces of a running container.
//!
//! Each namespace kind is an independent attempt. Mount-namespace failures
//! are downgraded to warnings; other failures are reported but never stop
//! the remaining joins. Only the subsequent change of root is mandatory.

use std::fs::File;
use std::path::Path;

use husk_common::error::{HuskError, Result};
use nix::sched::setns;
use nix::unistd::{chdir, chroot};

use super::NamespaceKind;

/// Result of one namespace join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The namespace was joined.
    Joined,
    /// The join failed but the failure is tolerated.
    Warned(String),
    /// The join failed.
    Failed(String),
}

/// Aggregated outcome of joining several namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Per-kind outcomes, in join order.
    pub outcomes: Vec<(NamespaceKind, JoinOutcome)>,
}

impl JoinReport {
    /// Whether every attempt succeeded.
    #[must_use]
    pub fn all_joined(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == JoinOutcome::Joined)
    }

    /// Kinds whose join failed outright.
    #[must_use]
    pub fn failed(&self) -> Vec<NamespaceKind> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, JoinOutcome::Failed(_)))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Whether the given kind was joined.
    #[must_use]
    pub fn joined(&self, kind: NamespaceKind) -> bool {
        self.outcomes
            .iter()
            .any(|(k, outcome)| *k == kind && *outcome == JoinOutcome::Joined)
    }
}

/// Classifies a failed join of `kind`.
#[must_use]
pub fn classify_failure(kind: NamespaceKind, reason: String) -> JoinOutcome {
    if kind == NamespaceKind::Mount {
        JoinOutcome::Warned(reason)
    } else {
        JoinOutcome::Failed(reason)
    }
}

/// Joins each of `kinds` of process `pid`, as listed under `proc_root`.
///
/// Joining the PID namespace affects only children created afterwards.
pub fn join_namespaces(proc_root: &Path, pid: u32, kinds: &[NamespaceKind]) -> JoinReport {
    let outcomes = kinds
        .iter()
        .map(|&kind| {
            let outcome = match join_one(proc_root, pid, kind) {
                Ok(()) => JoinOutcome::Joined,
                Err(reason) => classify_failure(kind, reason),
            };
            match &outcome {
                JoinOutcome::Joined => tracing::debug!(pid, namespace = %kind, "namespace joined"),
                JoinOutcome::Warned(reason) => {
                    tracing::warn!(pid, namespace = %kind, %reason, "namespace join failed (ignored)");
                }
                JoinOutcome::Failed(reason) => {
                    tracing::error!(pid, namespace = %kind, %reason, "namespace join failed");
                }
            }
            (kind, outcome)
        })
        .collect();
    JoinReport { outcomes }
}

fn join_one(proc_root: &Path, pid: u32, kind: NamespaceKind) -> std::result::Result<(), String> {
    let path = kind.handle_path(proc_root, pid);
    let handle = File::open(&path).map_err(|e| format!("open {}: {e}", path.display()))?;
    setns(&handle, kind.clone_flag()).map_err(|e| format!("setns {}: {e}", path.display()))
}

/// Changes root to `root` and the working directory to `/`.
///
/// # Errors
///
/// Returns an error if either call fails.
pub fn enter_root(root: &Path) -> Result<()> {
    chroot(root).map_err(|e| HuskError::syscall("chroot", root.display(), e))?;
    chdir("/").map_err(|e| HuskError::syscall("chdir", "/", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_failures_are_only_warnings() {
        assert!(matches!(
            classify_failure(NamespaceKind::Mount, "EPERM".into()),
            JoinOutcome::Warned(_)
        ));
        assert!(matches!(
            classify_failure(NamespaceKind::Pid, "EPERM".into()),
            JoinOutcome::Failed(_)
        ));
    }

    #[test]
    fn every_kind_is_attempted_despite_failures() {
        let fake_proc = tempfile::tempdir().expect("tempdir");
        let report = join_namespaces(fake_proc.path(), 4242, &NamespaceKind::JOIN_ORDER);

        assert_eq!(report.outcomes.len(), 5);
        assert!(!report.all_joined());
        assert!(matches!(report.outcomes[0].1, JoinOutcome::Warned(_)));
        assert_eq!(
            report.failed(),
            vec![
                NamespaceKind::Uts,
                NamespaceKind::Ipc,
                NamespaceKind::Network,
                NamespaceKind::Pid
            ]
        );
        assert!(!report.joined(NamespaceKind::Pid));
    }

    #[test]
    fn empty_report_counts_as_all_joined() {
        assert!(JoinReport::default().all_joined());
    }
}
