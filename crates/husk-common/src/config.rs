//! Global configuration model for the husk runtime.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for the husk runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuskConfig {
    /// Base directory for container records and layer sets.
    pub data_dir: PathBuf,
    /// Directory holding `manifest.json` and layer archives.
    pub image_dir: PathBuf,
    /// Hostname set inside each container.
    pub hostname: String,
}

impl HuskConfig {
    /// Creates a configuration rooted at the given data and image directories.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            image_dir: image_dir.into(),
            ..Self::default()
        }
    }

    /// Directory holding one record and one environment snapshot per container.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join(constants::STATE_SUBDIR)
    }

    /// Directory under which each container's layer set is created.
    #[must_use]
    pub fn layer_root(&self) -> PathBuf {
        self.data_dir.join(constants::LAYER_SUBDIR)
    }

    /// Path of the image manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.image_dir.join(constants::MANIFEST_FILE)
    }
}

impl Default for HuskConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::DEFAULT_DATA_DIR),
            image_dir: PathBuf::from(constants::DEFAULT_IMAGE_DIR),
            hostname: constants::CONTAINER_HOSTNAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_data_dir() {
        let cfg = HuskConfig::new("/srv/husk", "/srv/images");
        assert_eq!(cfg.state_dir(), PathBuf::from("/srv/husk/containers"));
        assert_eq!(cfg.layer_root(), PathBuf::from("/srv/husk/layers"));
        assert_eq!(cfg.manifest_path(), PathBuf::from("/srv/images/manifest.json"));
        assert_eq!(cfg.hostname, "container");
    }
}
