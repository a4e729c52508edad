//! Base layer extraction.
//!
//! A container's lower directory is populated by unpacking a single layer
//! archive. Permissions (and ownership, when running as root) are preserved
//! so the unpacked tree is usable as a root filesystem.

use std::io::Read;
use std::path::Path;

use husk_common::error::{HuskError, Result};

/// Summary of an extracted layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedLayer {
    /// Size of the archive in bytes.
    pub archive_bytes: u64,
    /// Number of archive entries unpacked.
    pub entries: usize,
}

/// Extracts a layer archive into `target`.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or an entry cannot be
/// unpacked.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<ExtractedLayer> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    std::fs::create_dir_all(target).map_err(|e| HuskError::io(target, e))?;

    let file = std::fs::File::open(archive_path).map_err(|e| HuskError::io(archive_path, e))?;
    let archive_bytes = file
        .metadata()
        .map_err(|e| HuskError::io(archive_path, e))?
        .len();

    let entries = if is_gzip_archive(archive_path) {
        unpack(flate2::read::GzDecoder::new(file), target)?
    } else {
        unpack(file, target)?
    };

    tracing::info!(entries, size = archive_bytes, "layer extracted");
    Ok(ExtractedLayer {
        archive_bytes,
        entries,
    })
}

fn unpack<R: Read>(reader: R, target: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    // Unprivileged callers cannot chown to the archive's owners.
    archive.set_preserve_ownerships(nix::unistd::geteuid().is_root());
    archive.set_overwrite(true);

    let mut count = 0;
    for entry in archive.entries().map_err(|e| HuskError::io(target, e))? {
        let mut entry = entry.map_err(|e| HuskError::io(target, e))?;
        let _ = entry.unpack_in(target).map_err(|e| HuskError::io(target, e))?;
        count += 1;
    }
    Ok(count)
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}
