//! Persistent container registry.
//!
//! One JSON record and one environment snapshot per container, named after
//! the identity, in a shared state directory that is the single source of
//! truth for every CLI invocation.
//!
//! Concurrency contract: there is no locking. Independent invocations may
//! race, e.g. `prune` deleting a record between another caller's lookup and
//! use. Records are replaced atomically (write then rename), and listings
//! skip records that disappear mid-scan; nothing stronger is promised.

use std::io::Write;
use std::path::{Path, PathBuf};

use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};
use husk_common::types::ContainerId;

use crate::container::ContainerRecord;

const RECORD_PREFIX: &str = "container_";
const RECORD_SUFFIX: &str = ".json";
const SNAPSHOT_SUFFIX: &str = ".env";

/// Repository of container records keyed by identity.
pub trait ContainerStore {
    /// Creates or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn put(&self, record: &ContainerRecord) -> Result<()>;

    /// Loads a record.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::NotFound`] if no record exists for `id`.
    fn get(&self, id: &ContainerId) -> Result<ContainerRecord>;

    /// Deletes a record and its environment snapshot. Deleting a missing
    /// record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    fn delete(&self, id: &ContainerId) -> Result<()>;

    /// Identities of every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn ids(&self) -> Result<Vec<ContainerId>>;

    /// Environment snapshot captured at start, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot exists but cannot be read.
    fn environment(&self, id: &ContainerId) -> Result<Option<Environment>>;

    /// Every readable record. Records that vanish or fail to decode during
    /// the scan are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> Result<Vec<ContainerRecord>> {
        let mut records = Vec::new();
        for id in self.ids()? {
            match self.get(&id) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Resolves an identity prefix to exactly one stored identity.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the prefix matches no record or several.
    fn resolve(&self, prefix: &str) -> Result<ContainerId> {
        resolve_prefix(&self.ids()?, prefix)
    }
}

/// Picks the single identity starting with `prefix`.
///
/// # Errors
///
/// Returns [`HuskError::NotFound`] for an empty or unmatched prefix and
/// [`HuskError::Ambiguous`] when more than one identity matches.
pub fn resolve_prefix(ids: &[ContainerId], prefix: &str) -> Result<ContainerId> {
    let not_found = || HuskError::NotFound {
        kind: "container",
        id: prefix.to_string(),
    };
    if prefix.is_empty() {
        return Err(not_found());
    }
    let matches: Vec<_> = ids.iter().filter(|id| id.matches_prefix(prefix)).collect();
    match matches.as_slice() {
        [] => Err(not_found()),
        [single] => Ok((*single).clone()),
        many => Err(HuskError::Ambiguous {
            prefix: prefix.to_string(),
            matches: many.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// Container store backed by files in one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| HuskError::io(&dir, e))?;
        tracing::debug!(path = %dir.display(), "opened container store");
        Ok(Self { dir })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `id`.
    #[must_use]
    pub fn record_path(&self, id: &ContainerId) -> PathBuf {
        record_path(&self.dir, id)
    }

    /// Path of the environment snapshot for `id`.
    #[must_use]
    pub fn environment_path(&self, id: &ContainerId) -> PathBuf {
        environment_path(&self.dir, id)
    }
}

/// Path of the record file for `id` under `dir`.
#[must_use]
pub fn record_path(dir: &Path, id: &ContainerId) -> PathBuf {
    dir.join(format!("{RECORD_PREFIX}{id}{RECORD_SUFFIX}"))
}

/// Path of the environment snapshot for `id` under `dir`.
#[must_use]
pub fn environment_path(dir: &Path, id: &ContainerId) -> PathBuf {
    dir.join(format!("{RECORD_PREFIX}{id}{SNAPSHOT_SUFFIX}"))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HuskError::io(path, e)),
    }
}

impl ContainerStore for FileStore {
    fn put(&self, record: &ContainerRecord) -> Result<()> {
        let path = self.record_path(&record.identity);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(record)?;
        let mut file = std::fs::File::create(&tmp).map_err(|e| HuskError::io(&tmp, e))?;
        file.write_all(&json).map_err(|e| HuskError::io(&tmp, e))?;
        file.sync_all().map_err(|e| HuskError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| HuskError::io(&path, e))?;
        tracing::debug!(id = %record.identity, pid = record.controlling_pid, "record saved");
        Ok(())
    }

    fn get(&self, id: &ContainerId) -> Result<ContainerRecord> {
        let path = self.record_path(id);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HuskError::NotFound {
                    kind: "container record",
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(HuskError::io(&path, e)),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    fn delete(&self, id: &ContainerId) -> Result<()> {
        remove_if_present(&self.record_path(id))?;
        remove_if_present(&self.environment_path(id))?;
        tracing::debug!(id = %id, "record deleted");
        Ok(())
    }

    fn ids(&self) -> Result<Vec<ContainerId>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| HuskError::io(&self.dir, e))?;
        let mut ids: Vec<_> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let id = name
                    .to_str()?
                    .strip_prefix(RECORD_PREFIX)?
                    .strip_suffix(RECORD_SUFFIX)?;
                ContainerId::parse(id).ok()
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn environment(&self, id: &ContainerId) -> Result<Option<Environment>> {
        let path = self.environment_path(id);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(Environment::from_snapshot(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HuskError::io(&path, e)),
        }
    }
}
