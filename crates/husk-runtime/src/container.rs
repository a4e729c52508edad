//! Container records and their observed status.

use std::path::PathBuf;

use husk_common::types::{ContainerId, ContainerStatus};
use serde::{Deserialize, Serialize};

/// Persistent metadata of one container.
///
/// Exists from the moment the controlling pid is known until `remove` or
/// `prune` reclaims it. The controlling pid may refer to a dead process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Unique identity.
    pub identity: ContainerId,
    /// Merged root of the container's layer set.
    pub root_path: PathBuf,
    /// Host pid of the container's init process.
    pub controlling_pid: u32,
}

/// A record together with its status at observation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// The stored record.
    pub record: ContainerRecord,
    /// Running if the controlling process was alive when observed.
    pub status: ContainerStatus,
}
