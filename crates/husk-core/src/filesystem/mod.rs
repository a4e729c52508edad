//! Filesystem management for container isolation.
//!
//! Provides the copy-on-write layer set behind each container root, the
//! mounts performed inside a new mount namespace, and device node
//! provisioning.

pub mod devices;
pub mod mount;
pub mod overlayfs;
