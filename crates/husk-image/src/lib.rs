//! # husk-image
//!
//! Image lookup for the husk runtime.
//!
//! Handles:
//! - **Manifest**: typed decoding of `manifest.json` (tag → ordered layers).
//! - **Layers**: extraction of a base layer archive into a directory.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod layer;
pub mod manifest;
