//! Domain primitive types used across the husk workspace.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::constants::ID_BYTES;
use crate::error::{HuskError, Result};

/// Unique identifier for a container instance.
///
/// A lowercase hex token of `2 * ID_BYTES` characters. Collisions are not
/// checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Parses a full container identity.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly `2 * ID_BYTES` hex characters.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.len() != ID_BYTES * 2 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HuskError::Config {
                message: format!("invalid container identity: {id:?}"),
            });
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Generates a random container ID.
    ///
    /// The bytes come from a v4 UUID, whose leading bytes are drawn from the
    /// operating system's CSPRNG and carry no version bits.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let mut hex = String::with_capacity(ID_BYTES * 2);
        for byte in &uuid.as_bytes()[..ID_BYTES] {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this identity starts with `prefix`.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(&prefix.to_ascii_lowercase())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observed state of a recorded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// The controlling process is alive on the host.
    Running,
    /// The controlling process no longer exists.
    Exited,
}

impl ContainerStatus {
    /// Classifies a container by the liveness of its controlling process.
    #[must_use]
    pub const fn from_liveness(alive: bool) -> Self {
        if alive { Self::Running } else { Self::Exited }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Exited => write!(f, "Exited"),
        }
    }
}
