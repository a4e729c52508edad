//! Read-only views of the host process table.
//!
//! All lookups go through a configurable proc root so callers can point
//! them at a fabricated tree.

use std::path::{Path, PathBuf};

use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};

use crate::namespace::NamespaceKind;

/// Default mount point of the host proc filesystem.
pub const PROC_ROOT: &str = "/proc";

/// Fields of `/proc/<pid>/status` used for namespace correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcStatus {
    /// Host pid of the parent (`PPid:`).
    pub ppid: Option<u32>,
    /// Pid in each nested PID namespace, outermost first (`NSpid:`).
    pub ns_pids: Vec<u32>,
}

impl ProcStatus {
    /// Parses the relevant lines of a status file.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut status = Self::default();
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("PPid:") {
                status.ppid = rest.trim().parse().ok();
            } else if let Some(rest) = line.strip_prefix("NSpid:") {
                status.ns_pids = rest
                    .split_whitespace()
                    .filter_map(|p| p.parse().ok())
                    .collect();
            }
        }
        status
    }

    /// Pid as seen from the innermost PID namespace.
    #[must_use]
    pub fn namespace_local_pid(&self) -> Option<u32> {
        self.ns_pids.last().copied()
    }
}

/// Handle on a proc filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTable {
    root: PathBuf,
}

impl ProcessTable {
    /// Uses the proc filesystem mounted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The proc root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// Whether a process with this host pid exists.
    #[must_use]
    pub fn is_alive(&self, pid: u32) -> bool {
        pid > 0 && self.entry(pid).exists()
    }

    /// Host pids in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the proc root cannot be listed.
    pub fn pids(&self) -> Result<Vec<u32>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| HuskError::io(&self.root, e))?;
        Ok(entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect())
    }

    /// Identity of the process's namespace of `kind`, e.g. `pid:[4026531836]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace link cannot be read.
    pub fn namespace_id(&self, pid: u32, kind: NamespaceKind) -> Result<String> {
        let link = kind.handle_path(&self.root, pid);
        let target = std::fs::read_link(&link).map_err(|e| HuskError::io(&link, e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    /// Parsed status of a process, if it is still readable.
    #[must_use]
    pub fn status(&self, pid: u32) -> Option<ProcStatus> {
        std::fs::read_to_string(self.entry(pid).join("status"))
            .ok()
            .map(|text| ProcStatus::parse(&text))
    }

    /// Namespace-local pid of a host process.
    #[must_use]
    pub fn namespace_local_pid(&self, pid: u32) -> Option<u32> {
        self.status(pid)?.namespace_local_pid()
    }

    /// Namespace-local pid of a host process's parent.
    ///
    /// A status file only reports its own namespace-local pid, so this is a
    /// two-step lookup: the host parent pid from the process's status, then
    /// the innermost pid from the parent's status.
    #[must_use]
    pub fn namespace_parent_pid(&self, pid: u32) -> Option<u32> {
        let host_parent = self.status(pid)?.ppid?;
        self.namespace_local_pid(host_parent)
    }

    /// Command line with arguments separated by spaces.
    #[must_use]
    pub fn cmdline(&self, pid: u32) -> String {
        std::fs::read(self.entry(pid).join("cmdline"))
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .split('\0')
                    .filter(|arg| !arg.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    /// Environment of a process.
    ///
    /// # Errors
    ///
    /// Returns an error if `environ` is unreadable, typically for lack of
    /// permission.
    pub fn environ(&self, pid: u32) -> Result<Environment> {
        let path = self.entry(pid).join("environ");
        let bytes = std::fs::read(&path).map_err(|e| HuskError::io(&path, e))?;
        Ok(Environment::from_proc_environ(&bytes))
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new(PROC_ROOT)
    }
}

/// Builders for fake proc trees, shared with dependent crates' tests.
#[cfg(any(test, feature = "test-support"))]
pub mod fixture {
    use std::io;
    use std::path::Path;

    /// Writes a `<root>/<pid>` entry with status, cmdline and a `ns/pid` link.
    ///
    /// `ns_pids` lists the pid in each nested namespace, outermost first.
    pub fn add_process(
        root: &Path,
        pid: u32,
        ppid: u32,
        ns_pids: &[u32],
        pid_ns: &str,
        cmd: &[&str],
    ) -> io::Result<()> {
        let dir = root.join(pid.to_string());
        std::fs::create_dir_all(dir.join("ns"))?;
        let ns_list: Vec<_> = ns_pids.iter().map(ToString::to_string).collect();
        std::fs::write(
            dir.join("status"),
            format!("Name:\tproc\nPPid:\t{ppid}\nNSpid:\t{}\n", ns_list.join("\t")),
        )?;
        std::fs::write(dir.join("cmdline"), format!("{}\0", cmd.join("\0")))?;
        std::os::unix::fs::symlink(pid_ns, dir.join("ns/pid"))
    }
}
