//! Table formatting for CLI listings.
//!
//! Columns are left-aligned and padded to the widest cell, so output stays
//! aligned for any identity or path length.

use std::fmt::Write;

use husk_runtime::container::ContainerSummary;
use husk_runtime::top::ProcessRow;

const CONTAINER_HEADER: [&str; 4] = ["CONTAINER ID", "PID", "STATUS", "ROOTFS"];
const PROCESS_HEADER: [&str; 4] = ["NSPID", "NSPPID", "HOSTPID", "CMD"];

/// Renders rows as an aligned table with a header line.
///
/// The last column is never padded.
#[must_use]
pub fn format_table<const N: usize>(header: [&str; N], rows: &[[String; N]]) -> String {
    let mut widths = header.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header = header.map(str::to_string);
    for row in std::iter::once(&header).chain(rows) {
        let mut line = String::new();
        for (i, (cell, width)) in row.iter().zip(widths).enumerate() {
            if i + 1 == N {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell:<width$}  ");
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// `ps` table: identity, pid, status, and merged root.
#[must_use]
pub fn container_table(containers: &[ContainerSummary]) -> String {
    let rows: Vec<_> = containers
        .iter()
        .map(|c| {
            [
                c.record.identity.to_string(),
                c.record.controlling_pid.to_string(),
                c.status.to_string(),
                c.record.root_path.display().to_string(),
            ]
        })
        .collect();
    format_table(CONTAINER_HEADER, &rows)
}

/// `top` table: namespace pid, namespace parent pid, host pid, command.
#[must_use]
pub fn process_table(processes: &[ProcessRow]) -> String {
    let rows: Vec<_> = processes
        .iter()
        .map(|p| {
            [
                optional_pid(p.ns_pid),
                optional_pid(p.ns_ppid),
                p.host_pid.to_string(),
                p.command.clone(),
            ]
        })
        .collect();
    format_table(PROCESS_HEADER, &rows)
}

fn optional_pid(pid: Option<u32>) -> String {
    pid.map_or_else(|| "-".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use husk_common::types::{ContainerId, ContainerStatus};
    use husk_runtime::container::ContainerRecord;

    use super::*;

    #[test]
    fn empty_listing_prints_header_only() {
        assert_eq!(container_table(&[]), "CONTAINER ID  PID  STATUS  ROOTFS\n");
    }

    #[test]
    fn container_rows_align_under_header() {
        let table = container_table(&[ContainerSummary {
            record: ContainerRecord {
                identity: ContainerId::parse("0123456789ab").expect("id"),
                root_path: PathBuf::from("/var/lib/husk/layers/0123456789ab/merged"),
                controlling_pid: 31337,
            },
            status: ContainerStatus::Running,
        }]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "CONTAINER ID  PID    STATUS   ROOTFS");
        assert_eq!(
            lines[1],
            "0123456789ab  31337  Running  /var/lib/husk/layers/0123456789ab/merged"
        );
    }

    #[test]
    fn unknown_namespace_pids_render_as_dash() {
        let table = process_table(&[ProcessRow {
            ns_pid: Some(1),
            ns_ppid: None,
            host_pid: 5000,
            command: "/bin/sh".into(),
        }]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "NSPID  NSPPID  HOSTPID  CMD");
        assert_eq!(lines[1], "1      -       5000     /bin/sh");
    }
}
