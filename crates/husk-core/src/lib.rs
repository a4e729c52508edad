//! # husk-core
//!
//! Low-level Linux isolation primitives for the husk runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: cloning a container's init into new UTS/PID/mount
//!   namespaces, its in-namespace setup, and joining a running container.
//! - **Filesystem**: `OverlayFS` layer sets, container mounts, device nodes.
//! - **Terminals**: pseudoterminal allocation and host relaying.
//! - **Process table**: liveness and PID-namespace correlation via procfs.
//!
//! Unsafe system calls are confined to small wrappers with
//! `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod filesystem;
pub mod namespace;
pub mod procfs;
pub mod terminal;
