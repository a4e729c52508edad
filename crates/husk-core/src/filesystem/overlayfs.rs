//! `OverlayFS` layer sets backing container roots.
//!
//! Each container owns four directories under `<layer_root>/<id>`: an
//! immutable `lower` populated from the base image layer, a writable
//! `upper`, the overlay `work` area, and the `merged` mount point that
//! becomes the container's root. Unmounting `merged` and deleting the tree
//! together form the only teardown.

use std::path::{Path, PathBuf};

use husk_common::error::{HuskError, Result};
use husk_common::types::ContainerId;
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags, mount, umount2};

use crate::filesystem::mount::is_mount_point;

/// Name of the mount point inside a layer set.
const MERGED: &str = "merged";

/// The directories making up one container's copy-on-write root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSet {
    /// Directory owning the whole set.
    pub base: PathBuf,
    /// Read-only base layer.
    pub lower: PathBuf,
    /// Writable delta layer.
    pub upper: PathBuf,
    /// Overlay scratch space.
    pub work: PathBuf,
    /// Union mount point.
    pub merged: PathBuf,
}

/// How the merged root was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// Nothing was mounted there.
    NotMounted,
    /// Unmounted immediately.
    Unmounted,
    /// The immediate unmount failed and the mount was lazily detached.
    Detached,
}

impl LayerSet {
    /// Lays out the set for a container under `layer_root`.
    #[must_use]
    pub fn for_container(layer_root: &Path, id: &ContainerId) -> Self {
        Self::at(layer_root.join(id.as_str()))
    }

    /// Recovers the set from a recorded merged root.
    ///
    /// When the path is not named `merged`, only that directory is
    /// considered part of the set.
    #[must_use]
    pub fn from_merged(merged: &Path) -> Self {
        match merged.parent() {
            Some(parent) if merged.file_name().is_some_and(|n| n == MERGED) => {
                Self::at(parent.to_path_buf())
            }
            _ => Self {
                base: merged.to_path_buf(),
                lower: merged.to_path_buf(),
                upper: merged.to_path_buf(),
                work: merged.to_path_buf(),
                merged: merged.to_path_buf(),
            },
        }
    }

    fn at(base: PathBuf) -> Self {
        Self {
            lower: base.join("lower"),
            upper: base.join("upper"),
            work: base.join("work"),
            merged: base.join(MERGED),
            base,
        }
    }

    /// Creates the set, populates `lower`, and mounts the overlay.
    ///
    /// `populate` receives the lower directory and fills it from the base
    /// image. On failure the partially built tree is removed.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Startup`] if directory creation, population, or
    /// the overlay mount fails.
    pub fn prepare<F>(layer_root: &Path, id: &ContainerId, populate: F) -> Result<Self>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let set = Self::for_container(layer_root, id);
        let result = set
            .create_dirs()
            .map_err(|e| startup("layout", &e))
            .and_then(|()| populate(&set.lower).map_err(|e| startup("extract", &e)))
            .and_then(|()| set.mount().map_err(|e| startup("mount", &e)));

        if let Err(err) = result {
            if let Err(cleanup) = set.teardown() {
                tracing::warn!(id = %id, error = %cleanup, "cleanup after failed prepare");
            }
            return Err(err);
        }
        Ok(set)
    }

    fn create_dirs(&self) -> Result<()> {
        for dir in [&self.lower, &self.upper, &self.work, &self.merged] {
            std::fs::create_dir_all(dir).map_err(|e| HuskError::io(dir, e))?;
        }
        Ok(())
    }

    /// Overlay mount options for this set.
    #[must_use]
    pub fn mount_options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower.display(),
            self.upper.display(),
            self.work.display()
        )
    }

    /// Mounts the overlay of `lower` and `upper` on `merged`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount syscall fails.
    pub fn mount(&self) -> Result<()> {
        let opts = self.mount_options();
        mount(
            Some("overlay"),
            &self.merged,
            Some("overlay"),
            MsFlags::empty(),
            Some(opts.as_str()),
        )
        .map_err(|e| HuskError::syscall("overlay mount", self.merged.display(), e))?;
        tracing::info!(merged = %self.merged.display(), "overlayfs mounted");
        Ok(())
    }

    /// Unmounts `merged`, falling back to a lazy detach when it is busy.
    ///
    /// # Errors
    ///
    /// Returns an error if both the immediate and the lazy unmount fail.
    pub fn unmount(&self) -> Result<UnmountOutcome> {
        if !self.merged.exists() || !is_mount_point(&self.merged).unwrap_or(true) {
            return Ok(UnmountOutcome::NotMounted);
        }
        match umount2(&self.merged, MntFlags::empty()) {
            Ok(()) => {
                tracing::info!(path = %self.merged.display(), "overlayfs unmounted");
                Ok(UnmountOutcome::Unmounted)
            }
            Err(Errno::EINVAL | Errno::ENOENT) => Ok(UnmountOutcome::NotMounted),
            Err(first) => {
                tracing::warn!(path = %self.merged.display(), error = %first, "unmount failed, detaching");
                umount2(&self.merged, MntFlags::MNT_DETACH)
                    .map_err(|e| HuskError::syscall("lazy unmount", self.merged.display(), e))?;
                tracing::info!(path = %self.merged.display(), "overlayfs detached");
                Ok(UnmountOutcome::Detached)
            }
        }
    }

    /// Unmounts and deletes the whole set.
    ///
    /// Idempotent: an already unmounted or deleted set is not an error.
    /// Deletion is attempted even when unmounting fails; in that case the
    /// still-mounted `merged` directory is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::Cleanup`] describing whatever could not be
    /// reclaimed.
    pub fn teardown(&self) -> Result<UnmountOutcome> {
        let unmounted = self.unmount();
        let still_mounted = unmounted.is_err();
        let removed = self.remove_dirs(still_mounted);

        match (unmounted, removed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(unmount), Ok(())) => Err(HuskError::Cleanup {
                path: self.merged.clone(),
                message: unmount.to_string(),
            }),
            (Ok(_), Err(remove)) => Err(HuskError::Cleanup {
                path: self.base.clone(),
                message: remove.to_string(),
            }),
            (Err(unmount), Err(remove)) => Err(HuskError::Cleanup {
                path: self.base.clone(),
                message: format!("{unmount}; {remove}"),
            }),
        }
    }

    fn remove_dirs(&self, keep_merged: bool) -> Result<()> {
        if !keep_merged {
            return remove_tree(&self.base);
        }
        for dir in [&self.lower, &self.upper, &self.work] {
            if dir != &self.merged {
                remove_tree(dir)?;
            }
        }
        Ok(())
    }
}

/// Tears down the layer set whose merged root is `merged`.
///
/// # Errors
///
/// See [`LayerSet::teardown`].
pub fn teardown(merged: &Path) -> Result<UnmountOutcome> {
    LayerSet::from_merged(merged).teardown()
}

fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HuskError::io(path, e)),
    }
}

fn startup(stage: &'static str, err: &HuskError) -> HuskError {
    HuskError::Startup {
        stage,
        message: err.to_string(),
    }
}
