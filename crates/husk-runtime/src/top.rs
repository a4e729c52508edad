//! Listing the processes of a container's PID namespace.

use husk_common::error::{HuskError, Result};
use husk_core::namespace::NamespaceKind;
use husk_core::procfs::ProcessTable;

use crate::container::ContainerRecord;

/// One process of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRow {
    /// Pid inside the container.
    pub ns_pid: Option<u32>,
    /// Parent pid inside the container.
    pub ns_ppid: Option<u32>,
    /// Pid on the host.
    pub host_pid: u32,
    /// Command line.
    pub command: String,
}

/// Processes sharing the PID namespace of `record`'s controlling process,
/// in process-table enumeration order.
///
/// Processes that exit during the scan are skipped.
///
/// # Errors
///
/// Returns [`HuskError::NotFound`] if the controlling process is gone, or an
/// error if the process table cannot be listed.
pub fn list_container_processes(procs: &ProcessTable, record: &ContainerRecord) -> Result<Vec<ProcessRow>> {
    let target = procs
        .namespace_id(record.controlling_pid, NamespaceKind::Pid)
        .map_err(|e| {
            tracing::debug!(pid = record.controlling_pid, error = %e, "no pid namespace");
            HuskError::NotFound {
                kind: "running container",
                id: record.identity.to_string(),
            }
        })?;

    Ok(procs
        .pids()?
        .into_iter()
        .filter(|&pid| {
            procs
                .namespace_id(pid, NamespaceKind::Pid)
                .is_ok_and(|ns| ns == target)
        })
        .map(|pid| ProcessRow {
            ns_pid: procs.namespace_local_pid(pid),
            ns_ppid: procs.namespace_parent_pid(pid),
            host_pid: pid,
            command: procs.cmdline(pid),
        })
        .collect())
}
