//! Typed image manifest.
//!
//! The manifest is the `manifest.json` written by `docker save`: a JSON array
//! of entries, each naming its repository tags and its layer archives
//! (bottom to top) relative to the image directory. It is decoded once and
//! shape mismatches fail the decode instead of surfacing during lookup.

use std::path::{Path, PathBuf};

use husk_common::error::{HuskError, Result};
use serde::Deserialize;

/// One image in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    /// Repository tags; `null` for untagged images.
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Option<Vec<String>>,
    /// Layer archive paths, bottom to top.
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
    /// Image configuration blob path, unused by the runtime.
    #[serde(rename = "Config", default)]
    pub config: Option<String>,
}

impl ManifestEntry {
    fn has_tag(&self, tag: &str) -> bool {
        self.repo_tags
            .as_deref()
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }
}

/// Decoded image manifest together with the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct ImageManifest {
    image_dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl ImageManifest {
    /// Loads and decodes the manifest at `path`.
    ///
    /// Layer paths resolve against the manifest's parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the
    /// manifest schema.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HuskError::io(path, e))?;
        let image_dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let manifest = Self::parse(&content, image_dir)?;
        tracing::debug!(path = %path.display(), images = manifest.entries.len(), "manifest loaded");
        Ok(manifest)
    }

    /// Decodes manifest JSON whose layer paths are relative to `image_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the manifest schema.
    pub fn parse(content: &str, image_dir: impl Into<PathBuf>) -> Result<Self> {
        let entries: Vec<ManifestEntry> = serde_json::from_str(content)?;
        Ok(Self {
            image_dir: image_dir.into(),
            entries,
        })
    }

    /// Returns every entry in manifest order.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Resolves a tag to the archive of its base layer.
    ///
    /// The first entry carrying the tag wins; its first layer is the base.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::ImageNotFound`] if no entry carries the tag or the
    /// matching entry lists no layers.
    pub fn base_layer(&self, tag: &str) -> Result<PathBuf> {
        let layer = self
            .entries
            .iter()
            .find(|e| e.has_tag(tag))
            .and_then(|e| e.layers.first())
            .ok_or_else(|| HuskError::ImageNotFound { tag: tag.into() })?;
        Ok(self.image_dir.join(layer))
    }
}
