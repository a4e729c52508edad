//! Mount utilities for container filesystem setup.
//!
//! Handles mount propagation, the `/proc` and `/dev/pts` mounts made inside
//! the container's namespaces, and mount-point detection for teardown.

use std::path::{Path, PathBuf};

use husk_common::error::{HuskError, Result};
use nix::mount::{MsFlags, mount};

/// Options for the container's private `devpts` instance.
const DEVPTS_OPTIONS: &str = "newinstance,ptmxmode=0666,mode=0620";

/// Marks every mount under `/` as private, recursively.
///
/// Must run after the process has entered its own mount namespace and
/// changed root, and before any namespace-local mount is made, so that
/// container mounts never propagate to the host or to sibling containers.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn make_root_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| HuskError::syscall("make-private mount", "/", e))?;
    tracing::debug!("root mount propagation set to private");
    Ok(())
}

/// Mounts a fresh `devpts` on `<root>/dev/pts` and a fresh `proc` on `<root>/proc`.
///
/// The `proc` instance reflects the PID namespace of the calling process.
///
/// # Errors
///
/// Returns an error if a mount point cannot be created or a mount fails.
pub fn mount_pseudo_filesystems(root: &Path) -> Result<()> {
    let pts = root.join("dev/pts");
    std::fs::create_dir_all(&pts).map_err(|e| HuskError::io(&pts, e))?;
    mount(
        Some("devpts"),
        &pts,
        Some("devpts"),
        MsFlags::empty(),
        Some(DEVPTS_OPTIONS),
    )
    .map_err(|e| HuskError::syscall("devpts mount", pts.display(), e))?;

    let proc = root.join("proc");
    std::fs::create_dir_all(&proc).map_err(|e| HuskError::io(&proc, e))?;
    mount(
        Some("proc"),
        &proc,
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        None::<&str>,
    )
    .map_err(|e| HuskError::syscall("proc mount", proc.display(), e))?;

    tracing::debug!(root = %root.display(), "devpts and proc mounted");
    Ok(())
}

/// Returns whether `path` is currently a mount point of the calling process.
///
/// # Errors
///
/// Returns an error if `/proc/self/mountinfo` cannot be read.
pub fn is_mount_point(path: &Path) -> Result<bool> {
    let Ok(path) = path.canonicalize() else {
        return Ok(false);
    };
    let mountinfo = Path::new("/proc/self/mountinfo");
    let content = std::fs::read_to_string(mountinfo).map_err(|e| HuskError::io(mountinfo, e))?;
    Ok(mount_points(&content).any(|p| p == path))
}

/// Iterates the mount-point column of a `mountinfo` table.
fn mount_points(mountinfo: &str) -> impl Iterator<Item = PathBuf> + '_ {
    mountinfo
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .map(|field| PathBuf::from(unescape_octal(field)))
}

/// Decodes the `\NNN` escapes the kernel uses for spaces, tabs and newlines.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
98 22 0:45 / /var/lib/husk/layers/abc/merged rw,relatime - overlay overlay rw,lowerdir=a
99 22 0:46 / /mnt/with\\040space rw - tmpfs tmpfs rw
";

    #[test]
    fn mount_points_reads_fifth_column() {
        let points: Vec<_> = mount_points(MOUNTINFO).collect();
        assert_eq!(points[0], PathBuf::from("/"));
        assert_eq!(points[1], PathBuf::from("/var/lib/husk/layers/abc/merged"));
    }

    #[test]
    fn mount_points_decode_escaped_spaces() {
        let points: Vec<_> = mount_points(MOUNTINFO).collect();
        assert_eq!(points[2], PathBuf::from("/mnt/with space"));
    }

    #[test]
    fn unescape_leaves_plain_backslashes() {
        assert_eq!(unescape_octal(r"a\b"), r"a\b");
        assert_eq!(unescape_octal(r"tab\011x"), "tab\tx");
    }

    #[test]
    fn missing_path_is_not_a_mount_point() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!is_mount_point(&dir.path().join("absent")).expect("mountinfo"));
    }

    #[test]
    fn plain_directory_is_not_a_mount_point() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sub = dir.path().join("merged");
        std::fs::create_dir(&sub).expect("mkdir");
        assert!(!is_mount_point(&sub).expect("mountinfo"));
    }
}
