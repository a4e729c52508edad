//! Linux namespace management for container isolation.
//!
//! Provides the clone-based launcher for a container's first process, the
//! setup that process performs inside its new namespaces, and best-effort
//! joining of a running container's namespaces.

pub mod init;
pub mod join;
pub mod launch;

use std::fmt;
use std::path::{Path, PathBuf};

use nix::sched::CloneFlags;

/// A namespace kind that can be created or joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Mount table.
    Mount,
    /// Hostname and domain name.
    Uts,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Network stack.
    Network,
    /// Process IDs.
    Pid,
}

impl NamespaceKind {
    /// Kinds joined by exec, in join order.
    pub const JOIN_ORDER: [Self; 5] = [Self::Mount, Self::Uts, Self::Ipc, Self::Network, Self::Pid];

    /// Entry name under `/proc/<pid>/ns/`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Network => "net",
            Self::Pid => "pid",
        }
    }

    /// The `clone(2)` / `setns(2)` flag selecting this kind.
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
        }
    }

    /// Path of this namespace's handle for `pid` under `proc_root`.
    #[must_use]
    pub fn handle_path(self, proc_root: &Path, pid: u32) -> PathBuf {
        proc_root
            .join(pid.to_string())
            .join("ns")
            .join(self.proc_name())
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// Configuration for which namespaces a new container receives.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate network namespace.
    pub network: bool,
}

impl NamespaceConfig {
    /// Combined `clone(2)` flags for the enabled namespaces.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        [
            (self.pid, NamespaceKind::Pid),
            (self.mount, NamespaceKind::Mount),
            (self.uts, NamespaceKind::Uts),
            (self.ipc, NamespaceKind::Ipc),
            (self.network, NamespaceKind::Network),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(CloneFlags::empty(), |flags, (_, kind)| flags | kind.clone_flag())
    }
}

impl Default for NamespaceConfig {
    /// UTS, PID and mount isolation; IPC and network stay shared with the host.
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            uts: true,
            ipc: false,
            network: false,
        }
    }
}
