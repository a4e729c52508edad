//! Container lifecycle management for the husk runtime.
//!
//! Ties the image, filesystem, namespace, and terminal layers together and
//! keeps the on-disk registry of containers.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod container;
pub mod exec;
pub mod lifecycle;
pub mod state;
pub mod top;
