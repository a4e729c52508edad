//! # husk-common
//!
//! Shared types, error definitions, configuration, and constants used
//! across the husk workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives every other crate builds on.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod types;
