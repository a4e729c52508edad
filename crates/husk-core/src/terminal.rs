//! Pseudoterminal allocation and relaying for container sessions.
//!
//! Interactive sessions wire the host terminal to the container through two
//! relay threads. Background sessions hand the multiplexer side to a
//! detached keeper process that drains it for as long as the container
//! lives, so the container's shell never sees its terminal hang up.

use std::fs::File;
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::thread::JoinHandle;

use husk_common::error::{HuskError, Result};
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::{ForkResult, dup2_stderr, dup2_stdin, dup2_stdout, fork, setsid};

/// Size of the relay and drain buffers.
const RELAY_BUFFER: usize = 4096;

/// A pseudoterminal pair.
#[derive(Debug)]
pub struct Pty {
    master: OwnedFd,
    slave: OwnedFd,
}

impl Pty {
    /// Opens a pair, optionally applying an initial window size.
    ///
    /// Both ends are close-on-exec; the child installs the slave on its
    /// standard streams explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if `openpty(3)` fails.
    pub fn open(size: Option<&Winsize>) -> Result<Self> {
        let OpenptyResult { master, slave } =
            openpty(size, None::<&Termios>).map_err(|e| HuskError::syscall("openpty", "pty", e))?;
        set_cloexec(&master)?;
        set_cloexec(&slave)?;
        tracing::debug!(
            rows = size.map(|s| s.ws_row),
            cols = size.map(|s| s.ws_col),
            "pty allocated"
        );
        Ok(Self { master, slave })
    }

    /// The side handed to the container process.
    #[must_use]
    pub fn slave(&self) -> BorrowedFd<'_> {
        self.slave.as_fd()
    }

    /// Closes the slave side and returns the multiplexer side.
    ///
    /// Call once the child holds its own copy of the slave.
    #[must_use]
    pub fn into_master(self) -> OwnedFd {
        drop(self.slave);
        self.master
    }
}

fn set_cloexec(fd: &OwnedFd) -> Result<()> {
    let _ = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map_err(|e| HuskError::syscall("fcntl(FD_CLOEXEC)", fd.as_raw_fd(), e))?;
    Ok(())
}

/// Reads the window size of the host terminal on standard input.
///
/// Returns `None` when standard input is not a terminal.
#[allow(unsafe_code)]
#[must_use]
pub fn host_window_size() -> Option<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes a winsize into the valid, exclusively
    // borrowed struct.
    let ret = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &raw mut size) };
    (ret == 0).then_some(size)
}

/// Makes `slave` the controlling terminal and standard streams of the
/// calling process.
///
/// Intended for a freshly cloned child before it execs: starts a new
/// session, acquires the terminal, and duplicates it onto descriptors 0-2.
/// The original descriptor is close-on-exec and goes away with the exec.
/// Performs no allocation.
///
/// # Errors
///
/// Returns the errno of the first failing call.
#[allow(unsafe_code)]
pub fn make_controlling_terminal(slave: BorrowedFd<'_>) -> nix::Result<()> {
    let _ = setsid()?;
    // SAFETY: slave is an open terminal descriptor; TIOCSCTTY takes an int
    // argument and does not retain pointers.
    if unsafe { libc::ioctl(slave.as_raw_fd(), libc::TIOCSCTTY, 0) } < 0 {
        return Err(nix::errno::Errno::last());
    }
    dup2_stdin(slave)?;
    dup2_stdout(slave)?;
    dup2_stderr(slave)?;
    Ok(())
}

/// Puts the host terminal into raw mode until dropped.
#[derive(Debug)]
pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    /// Switches standard input to raw mode.
    ///
    /// Returns `None` when standard input is not a terminal or its
    /// attributes cannot be changed.
    #[must_use]
    pub fn enter() -> Option<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return None;
        }
        let original = termios::tcgetattr(&stdin).ok()?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw) {
            tracing::warn!(error = %e, "could not switch host terminal to raw mode");
            return None;
        }
        Some(Self { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(&io::stdin(), SetArg::TCSANOW, &self.original) {
            tracing::warn!(error = %e, "could not restore host terminal");
        }
    }
}

/// Host terminal wired to a container's pseudoterminal.
#[derive(Debug)]
pub struct InteractiveSession {
    master: OwnedFd,
    output: JoinHandle<()>,
    _input: JoinHandle<()>,
}

impl InteractiveSession {
    /// Starts the host-to-container and container-to-host relays.
    ///
    /// The two relays run independently; one reaching end of stream does not
    /// stop the other.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplexer cannot be duplicated for the relays.
    pub fn attach(master: OwnedFd) -> Result<Self> {
        let to_container = File::from(dup(&master)?);
        let from_container = File::from(dup(&master)?);

        let input = std::thread::spawn(move || {
            let _ = relay(io::stdin().lock(), to_container);
        });
        let output = std::thread::spawn(move || {
            let _ = relay(from_container, io::stdout().lock());
        });

        Ok(Self {
            master,
            output,
            _input: input,
        })
    }

    /// Closes the session's multiplexer and waits for container output to drain.
    ///
    /// Call after the container process has exited. The input relay stays
    /// parked on host input and ends with the managing process.
    pub fn finish(self) {
        drop(self.master);
        if self.output.join().is_err() {
            tracing::warn!("output relay panicked");
        }
    }
}

fn dup(fd: &OwnedFd) -> Result<OwnedFd> {
    fd.try_clone()
        .map_err(|e| HuskError::io("pty multiplexer", e))
}

/// Copies `reader` into `writer`, flushing after every chunk.
///
/// Returns the number of bytes relayed once either side ends or fails.
pub fn relay<R: Read, W: Write>(mut reader: R, mut writer: W) -> u64 {
    let mut buf = [0u8; RELAY_BUFFER];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if writer.write_all(&buf[..n]).is_err() || writer.flush().is_err() {
            break;
        }
        total += n as u64;
    }
    total
}

/// Reads and discards `reader` until it ends, returning the bytes consumed.
pub fn drain<R: Read>(reader: R) -> u64 {
    relay(reader, io::sink())
}

/// Hands the multiplexer to a detached keeper process that drains it.
///
/// The keeper holds the terminal open for the container's whole lifetime
/// and exits once every slave holder is gone. Returns the keeper's pid.
///
/// Must be called while the managing process is single-threaded.
///
/// # Errors
///
/// Returns an error if `fork(2)` fails.
#[allow(unsafe_code)]
pub fn detach_drain(master: OwnedFd) -> Result<u32> {
    // SAFETY: the managing process has not spawned threads at this point,
    // so the child inherits a consistent heap and no held locks.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            drop(master);
            let pid = u32::try_from(child.as_raw()).unwrap_or_default();
            tracing::debug!(keeper = pid, "background terminal keeper started");
            Ok(pid)
        }
        Ok(ForkResult::Child) => {
            let _ = setsid();
            silence_stdio();
            let _ = drain(File::from(master));
            // SAFETY: _exit skips the parent's atexit handlers and stdio
            // buffers, which the keeper must not run twice.
            unsafe { libc::_exit(0) }
        }
        Err(e) => Err(HuskError::syscall("fork", "terminal keeper", e)),
    }
}

fn silence_stdio() {
    let Ok(null) = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
    else {
        return;
    };
    let _ = dup2_stdin(&null);
    let _ = dup2_stdout(&null);
    let _ = dup2_stderr(&null);
}
