//! Minimal `/dev` population for a container root.
//!
//! A shell needs a handful of character devices and a pty multiplexer it
//! can reach both as `/dev/ptmx` and `/dev/pts/ptmx`. Existing entries are
//! never replaced, so provisioning a root twice is harmless.

use std::path::Path;

use husk_common::error::{HuskError, Result};
use nix::sys::stat::{Mode, SFlag, makedev, mknod};

/// A character device node to create under `/dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    /// File name under `/dev`.
    pub name: &'static str,
    /// Kernel major number.
    pub major: u64,
    /// Kernel minor number.
    pub minor: u64,
    /// Permission bits applied at creation.
    pub mode: u32,
}

/// Devices every container root receives.
pub const DEVICES: [DeviceNode; 5] = [
    DeviceNode { name: "null", major: 1, minor: 3, mode: 0o666 },
    DeviceNode { name: "zero", major: 1, minor: 5, mode: 0o666 },
    DeviceNode { name: "tty", major: 5, minor: 0, mode: 0o666 },
    DeviceNode { name: "console", major: 5, minor: 1, mode: 0o600 },
    DeviceNode { name: "ptmx", major: 5, minor: 2, mode: 0o666 },
];

/// Target of the `/dev/pts/ptmx` link, as seen from inside the container.
const PTMX_LINK_TARGET: &str = "/dev/ptmx";

/// What a provisioning pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Entries created by this pass.
    pub created: Vec<&'static str>,
    /// Entries that already existed and were left alone.
    pub present: Vec<&'static str>,
}

/// Ensures the standard device nodes and the pty link exist under `root/dev`.
///
/// # Errors
///
/// Returns an error only when a missing entry cannot be created.
pub fn provision(root: &Path) -> Result<ProvisionReport> {
    let dev = root.join("dev");
    std::fs::create_dir_all(&dev).map_err(|e| HuskError::io(&dev, e))?;

    let mut report = ProvisionReport::default();
    for node in &DEVICES {
        let path = dev.join(node.name);
        if exists(&path) {
            report.present.push(node.name);
            continue;
        }
        mknod(
            &path,
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(node.mode),
            makedev(node.major, node.minor),
        )
        .map_err(|e| HuskError::syscall("mknod", path.display(), e))?;
        tracing::debug!(device = node.name, major = node.major, minor = node.minor, "device created");
        report.created.push(node.name);
    }

    let pts = dev.join("pts");
    std::fs::create_dir_all(&pts).map_err(|e| HuskError::io(&pts, e))?;
    let link = pts.join("ptmx");
    if exists(&link) {
        report.present.push("pts/ptmx");
    } else {
        std::os::unix::fs::symlink(PTMX_LINK_TARGET, &link).map_err(|e| HuskError::io(&link, e))?;
        report.created.push("pts/ptmx");
    }

    Ok(report)
}

/// Existence without following symlinks; a dangling link still counts.
fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_devices(root: &Path) {
        let dev = root.join("dev");
        std::fs::create_dir_all(&dev).expect("mkdir dev");
        for node in &DEVICES {
            std::fs::write(dev.join(node.name), node.name).expect("stub device");
        }
    }

    #[test]
    fn device_table_uses_standard_numbers() {
        let numbers: Vec<_> = DEVICES.iter().map(|d| (d.name, d.major, d.minor)).collect();
        assert_eq!(
            numbers,
            vec![
                ("null", 1, 3),
                ("zero", 1, 5),
                ("tty", 5, 0),
                ("console", 5, 1),
                ("ptmx", 5, 2),
            ]
        );
    }

    #[test]
    fn existing_entries_are_not_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        stub_devices(dir.path());

        let report = provision(dir.path()).expect("provision");
        assert_eq!(report.present.len(), DEVICES.len());
        assert_eq!(report.created, vec!["pts/ptmx"]);
        let content = std::fs::read_to_string(dir.path().join("dev/null")).expect("read stub");
        assert_eq!(content, "null");
    }

    #[test]
    fn pts_link_points_at_root_multiplexer() {
        let dir = tempfile::tempdir().expect("tempdir");
        stub_devices(dir.path());
        let _ = provision(dir.path()).expect("provision");

        let target = std::fs::read_link(dir.path().join("dev/pts/ptmx")).expect("readlink");
        assert_eq!(target, Path::new("/dev/ptmx"));
    }

    #[test]
    fn second_pass_creates_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        stub_devices(dir.path());
        let _ = provision(dir.path()).expect("first pass");

        let again = provision(dir.path()).expect("second pass");
        assert!(again.created.is_empty());
        assert_eq!(again.present.len(), DEVICES.len() + 1);
    }

    #[test]
    #[ignore = "requires CAP_MKNOD"]
    fn creates_character_devices_with_expected_numbers() {
        use std::os::unix::fs::{FileTypeExt, MetadataExt};

        let dir = tempfile::tempdir().expect("tempdir");
        let _ = provision(dir.path()).expect("first pass");
        let _ = provision(dir.path()).expect("second pass");

        for node in &DEVICES {
            let meta = std::fs::metadata(dir.path().join("dev").join(node.name)).expect("stat");
            assert!(meta.file_type().is_char_device());
            assert_eq!(meta.rdev(), makedev(node.major, node.minor));
        }
    }
}
