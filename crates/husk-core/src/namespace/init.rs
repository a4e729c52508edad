//! Setup performed by a container's first process inside its namespaces.
//!
//! Runs in two phases. The setup phase sets the hostname, changes root,
//! provisions devices, privatizes mount propagation, mounts `devpts` and
//! `proc`, and fixes the environment. The handoff phase execs the user
//! command, which becomes PID 1 of the namespace. Nothing is cleaned up
//! after handoff, so every resource the command needs is in place first.
//! Any setup failure is fatal: no container exists until handoff.

use std::convert::Infallible;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};
use nix::unistd::{chdir, chroot, execve, sethostname};

use crate::command::{env_cstrings, resolve_program, to_cstrings};
use crate::filesystem::{devices, mount};

/// Internal variables that must not leak into the container.
const INTERNAL_VARS: [&str; 3] = [
    husk_common::constants::ENV_ROOTFS,
    husk_common::constants::ENV_CONTAINER_ID,
    husk_common::constants::ENV_DATA_DIR,
];

/// Variables every container process starts with, overriding inherited ones.
pub const CONTAINER_ENV: [(&str, &str); 8] = [
    ("TERM", "xterm"),
    ("HOME", "/root"),
    ("USER", "root"),
    ("PATH", "/bin:/usr/bin:/sbin:/usr/sbin"),
    ("PS1", "[container \\u@\\h \\w]# "),
    ("PROMPT_COMMAND", ""),
    ("LC_ALL", "C"),
    ("LANG", "C"),
];

/// Parameters of the in-namespace setup.
#[derive(Debug, Clone)]
pub struct InitSpec {
    /// Merged root to change into.
    pub rootfs: PathBuf,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// User command; the first element is the program.
    pub command: Vec<String>,
    /// Environment inherited from the launcher.
    pub inherited: Environment,
    /// Where to record the final environment, as seen from the host.
    pub snapshot_path: Option<PathBuf>,
}

/// Builds the container environment from an inherited one.
#[must_use]
pub fn container_environment(inherited: &Environment) -> Environment {
    let mut env = inherited.clone();
    for key in INTERNAL_VARS {
        env.remove(key);
    }
    for (key, value) in CONTAINER_ENV {
        env.set(key, value);
    }
    env
}

/// Performs the setup phase and execs the user command.
///
/// Only returns on failure.
///
/// # Errors
///
/// Returns an error if any setup step or the final exec fails.
pub fn run(spec: &InitSpec) -> Result<Infallible> {
    let program = spec.command.first().ok_or_else(|| HuskError::Config {
        message: "no command given to run in the container".into(),
    })?;
    tracing::debug!(rootfs = %spec.rootfs.display(), command = ?spec.command, "container init");

    sethostname(&spec.hostname)
        .map_err(|e| HuskError::syscall("sethostname", &spec.hostname, e))?;

    // Opened before chroot: the snapshot lives on the host side.
    let snapshot = spec.snapshot_path.as_deref().and_then(open_snapshot);

    chroot(&spec.rootfs).map_err(|e| HuskError::syscall("chroot", spec.rootfs.display(), e))?;
    chdir("/").map_err(|e| HuskError::syscall("chdir", "/", e))?;

    let root = Path::new("/");
    let report = devices::provision(root)?;
    tracing::debug!(created = ?report.created, present = ?report.present, "devices provisioned");
    mount::make_root_private()?;
    mount::mount_pseudo_filesystems(root)?;

    let env = container_environment(&spec.inherited);
    if let Some(file) = snapshot {
        write_snapshot(file, &env);
    }

    let resolved = resolve_program(program, &env, root).ok_or_else(|| HuskError::NotFound {
        kind: "command",
        id: program.clone(),
    })?;
    let path = to_cstrings([resolved.to_string_lossy()])?;
    let argv = to_cstrings(&spec.command)?;
    let envp = env_cstrings(&env)?;

    let Err(e) = execve(&path[0], &argv, &envp);
    Err(HuskError::syscall("execve", resolved.display(), e))
}

fn open_snapshot(path: &Path) -> Option<File> {
    match File::create(path) {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "environment snapshot unavailable");
            None
        }
    }
}

fn write_snapshot(mut file: File, env: &Environment) {
    if let Err(e) = file.write_all(env.to_snapshot().as_bytes()) {
        tracing::warn!(error = %e, "failed to write environment snapshot");
    }
}
