//! Unified error type for the husk workspace.
//!
//! Variants map onto four classes of failure: fatal startup errors, lookup
//! errors, cleanup anomalies, and plain I/O or configuration problems.
//! Best-effort warnings never become errors; they are emitted as
//! `tracing::warn!` events by the code that tolerates them.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HuskError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A system call failed.
    #[error("{op} failed on {target}: {source}")]
    Syscall {
        /// Name of the failed operation.
        op: &'static str,
        /// Path or object the operation was applied to.
        target: String,
        /// Errno reported by the kernel.
        source: nix::errno::Errno,
    },

    /// A configuration value or argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An identity prefix matched more than one container.
    #[error("prefix {prefix} matches {} containers: {}", matches.len(), matches.join(", "))]
    Ambiguous {
        /// The prefix supplied by the caller.
        prefix: String,
        /// Every identity the prefix matched.
        matches: Vec<String>,
    },

    /// No manifest entry carries the requested tag.
    #[error("image not found: {tag}")]
    ImageNotFound {
        /// The tag that failed to resolve.
        tag: String,
    },

    /// Container startup aborted.
    #[error("container startup failed during {stage}: {message}")]
    Startup {
        /// Startup stage that failed (extract, mount, launch, ...).
        stage: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Teardown could not fully reclaim a filesystem layer.
    #[error("cleanup anomaly at {path}: {message}")]
    Cleanup {
        /// Merged root or layer directory being reclaimed.
        path: PathBuf,
        /// Description of what could not be reclaimed.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HuskError {
    /// Builds an [`HuskError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds an [`HuskError::Syscall`] for the given operation and target.
    pub fn syscall(op: &'static str, target: impl ToString, source: nix::errno::Errno) -> Self {
        Self::Syscall {
            op,
            target: target.to_string(),
            source,
        }
    }

    /// Returns whether this is a lookup failure (unknown or ambiguous identity).
    #[must_use]
    pub const fn is_lookup(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Ambiguous { .. })
    }

    /// Returns whether this error aborts a container start.
    #[must_use]
    pub const fn is_fatal_startup(&self) -> bool {
        matches!(self, Self::ImageNotFound { .. } | Self::Startup { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HuskError>;
