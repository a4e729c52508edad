//! Spawning a container's first process in new namespaces.
//!
//! The process is created with `clone(2)` so that it is itself PID 1 of the
//! new PID namespace. Before exec it optionally adopts a pseudoterminal as
//! its controlling terminal; everything else (hostname, root, mounts) is
//! done by the program it execs, see [`super::init`].

use std::ffi::CString;
use std::os::fd::BorrowedFd;
use std::path::PathBuf;

use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};
use nix::errno::Errno;
use nix::sched::clone;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{Pid, execve};

use super::NamespaceConfig;
use crate::command::{env_cstrings, to_cstrings};
use crate::terminal::make_controlling_terminal;

/// Stack handed to the cloned child; it only runs until exec.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit code of a child that could not acquire its terminal.
const EXIT_TERMINAL_FAILED: isize = 126;

/// Exit code of a child whose exec failed.
const EXIT_EXEC_FAILED: isize = 127;

/// What to run as a container's first process.
#[derive(Debug)]
pub struct LaunchSpec<'a> {
    /// Program to exec in the child.
    pub program: PathBuf,
    /// Full argument vector, including `argv[0]`.
    pub args: Vec<String>,
    /// Environment of the child.
    pub env: Environment,
    /// Namespaces the child is created in.
    pub namespaces: NamespaceConfig,
    /// Terminal to install as controlling terminal and standard streams.
    pub terminal: Option<BorrowedFd<'a>>,
}

/// How a container's first process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(Signal),
}

impl ExitStatus {
    /// Shell-style exit code: the status, or 128 plus the signal number.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal as i32,
        }
    }
}

/// Handle to a launched container process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerProcess {
    pid: Pid,
}

impl ContainerProcess {
    /// Host pid of the process.
    #[must_use]
    pub fn pid(&self) -> u32 {
        u32::try_from(self.pid.as_raw()).unwrap_or_default()
    }

    /// Blocks until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails for a reason other than an
    /// interrupted call.
    pub fn wait(&self) -> Result<ExitStatus> {
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(ExitStatus::Signaled(signal)),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(HuskError::syscall("waitpid", self.pid, e)),
            }
        }
    }

    /// Sends SIGKILL; used to abandon a start that cannot be recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub fn kill(&self) -> Result<()> {
        kill(self.pid, Signal::SIGKILL).map_err(|e| HuskError::syscall("kill", self.pid, e))
    }
}

/// Creates the child in new namespaces and execs `spec.program` in it.
///
/// Returns as soon as the child exists; its in-namespace setup continues
/// concurrently.
///
/// # Errors
///
/// Returns [`HuskError::Startup`] if the arguments cannot be encoded or
/// `clone(2)` fails.
#[allow(unsafe_code)]
pub fn launch(spec: &LaunchSpec<'_>) -> Result<ContainerProcess> {
    let program = to_cstrings([spec.program.to_string_lossy()])?
        .pop()
        .ok_or_else(|| launch_error("empty program path"))?;
    let argv = to_cstrings(&spec.args)?;
    if argv.is_empty() {
        return Err(launch_error("empty argument vector"));
    }
    let envp = env_cstrings(&spec.env)?;
    let terminal = spec.terminal;

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let flags = spec.namespaces.clone_flags();
    let callback = Box::new(|| child_main(&program, &argv, &envp, terminal));

    // SAFETY: without CLONE_VM the child runs on a private copy of the
    // address space, using `stack` only until execve replaces it. The
    // managing process is single-threaded here, so the copy holds no
    // foreign locks.
    let pid = unsafe { clone(callback, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| launch_error(&format!("clone({flags:?}) failed: {e}")))?;

    tracing::info!(pid = pid.as_raw(), program = %spec.program.display(), ?flags, "container process cloned");
    Ok(ContainerProcess { pid })
}

fn child_main(
    program: &CString,
    argv: &[CString],
    envp: &[CString],
    terminal: Option<BorrowedFd<'_>>,
) -> isize {
    if let Some(fd) = terminal {
        if make_controlling_terminal(fd).is_err() {
            return EXIT_TERMINAL_FAILED;
        }
    }
    match execve(program, argv, envp) {
        Ok(never) => match never {},
        Err(_) => EXIT_EXEC_FAILED,
    }
}

fn launch_error(message: &str) -> HuskError {
    HuskError::Startup {
        stage: "launch",
        message: message.to_string(),
    }
}
