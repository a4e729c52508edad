//! Container lifecycle: start, stop, remove, prune, and listing.

use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use husk_common::config::HuskConfig;
use husk_common::constants;
use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};
use husk_common::types::{ContainerId, ContainerStatus};
use husk_core::filesystem::overlayfs::{self, LayerSet};
use husk_core::namespace::NamespaceConfig;
use husk_core::namespace::launch::{self, ContainerProcess, ExitStatus, LaunchSpec};
use husk_core::procfs::ProcessTable;
use husk_core::terminal::{self, InteractiveSession, Pty, RawModeGuard};
use husk_image::layer::extract_layer;
use husk_image::manifest::ImageManifest;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::container::{ContainerRecord, ContainerSummary};
use crate::exec::Attacher;
use crate::state::{ContainerStore, FileStore};

/// How a started container is attached to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Relay the host terminal and wait for the container to exit.
    Interactive,
    /// Return once the container is recorded.
    Background,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// The record persisted for the container.
    pub record: ContainerRecord,
    /// Exit status, for interactive starts.
    pub exit: Option<ExitStatus>,
    /// Pid of the process holding the terminal, for background starts.
    pub keeper_pid: Option<u32>,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// SIGKILL was delivered.
    Killed,
    /// The controlling process no longer existed.
    AlreadyExited,
}

/// A container prune could not handle normally.
#[derive(Debug)]
pub struct CleanupAnomaly {
    /// Container concerned.
    pub identity: ContainerId,
    /// What went wrong.
    pub error: HuskError,
}

/// Outcome of a prune pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Containers whose layers and records were removed.
    pub reclaimed: Vec<ContainerId>,
    /// Records that failed to decode, paired with the decode error. Their
    /// files and the layer set derived from the identity were removed.
    pub unreadable: Vec<CleanupAnomaly>,
    /// Containers left in place because cleanup failed.
    pub anomalies: Vec<CleanupAnomaly>,
}

impl PruneReport {
    fn left_in_place(&mut self, identity: ContainerId, error: HuskError) {
        tracing::warn!(id = %identity, %error, "prune left container in place");
        self.anomalies.push(CleanupAnomaly { identity, error });
    }
}

/// Coordinates image lookup, layer sets, launching, and the registry.
pub struct LifecycleManager {
    config: HuskConfig,
    store: Box<dyn ContainerStore>,
    procs: ProcessTable,
    launcher: PathBuf,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.config)
            .field("procs", &self.procs)
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Opens the file-backed registry under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be created or the
    /// current executable cannot be located.
    pub fn open(config: HuskConfig) -> Result<Self> {
        let store = FileStore::open(config.state_dir())?;
        let launcher = std::env::current_exe().map_err(|e| HuskError::io("/proc/self/exe", e))?;
        Ok(Self::with_parts(config, Box::new(store), ProcessTable::default(), launcher))
    }

    /// Assembles a manager from explicit parts.
    #[must_use]
    pub fn with_parts(
        config: HuskConfig,
        store: Box<dyn ContainerStore>,
        procs: ProcessTable,
        launcher: PathBuf,
    ) -> Self {
        Self {
            config,
            store,
            procs,
            launcher,
        }
    }

    /// The runtime configuration.
    #[must_use]
    pub fn config(&self) -> &HuskConfig {
        &self.config
    }

    /// The container registry.
    #[must_use]
    pub fn store(&self) -> &dyn ContainerStore {
        self.store.as_ref()
    }

    /// An attacher over this manager's registry whose direct path re-invokes
    /// the same binary against the same data directory.
    #[must_use]
    pub fn attacher(&self) -> Attacher<'_> {
        Attacher::new(self.store(), &self.procs, &self.launcher, &self.config.data_dir)
    }

    /// The process table used for liveness checks.
    #[must_use]
    pub fn procs(&self) -> &ProcessTable {
        &self.procs
    }

    /// Starts `command` in a new container built from `image_tag`.
    ///
    /// Everything acquired before the record is persisted is released on
    /// failure. An interactive start blocks until the container exits and
    /// tears down its layers; its record stays until pruned.
    ///
    /// # Errors
    ///
    /// Returns [`HuskError::ImageNotFound`] for an unknown tag,
    /// [`HuskError::Startup`] if any setup step fails, or the registry error
    /// if the record cannot be written.
    pub fn start(&self, image_tag: &str, command: &[String], mode: StartMode) -> Result<StartOutcome> {
        if command.is_empty() {
            return Err(HuskError::Config {
                message: "no command given to run in the container".into(),
            });
        }
        let manifest = ImageManifest::load(&self.config.manifest_path()).map_err(|e| {
            HuskError::Startup {
                stage: "manifest",
                message: e.to_string(),
            }
        })?;
        let archive = manifest.base_layer(image_tag)?;

        let id = ContainerId::generate();
        tracing::info!(id = %id, image = image_tag, ?command, "starting container");
        let layers = LayerSet::prepare(&self.config.layer_root(), &id, |lower| {
            extract_layer(&archive, lower).map(|layer| {
                tracing::debug!(entries = layer.entries, bytes = layer.archive_bytes, "base layer unpacked");
            })
        })?;

        let window = match mode {
            StartMode::Interactive => terminal::host_window_size(),
            StartMode::Background => None,
        };
        let pty = match Pty::open(window.as_ref()) {
            Ok(pty) => pty,
            Err(e) => return Err(abandon(&layers, None, e)),
        };
        let process = match self.launch_init(&id, &layers.merged, command, &pty) {
            Ok(process) => process,
            Err(e) => return Err(abandon(&layers, None, e)),
        };
        let master = pty.into_master();

        let record = ContainerRecord {
            identity: id,
            root_path: layers.merged.clone(),
            controlling_pid: process.pid(),
        };
        if let Err(e) = self.store.put(&record) {
            return Err(abandon(&layers, Some(&process), e));
        }
        tracing::info!(id = %record.identity, pid = record.controlling_pid, "container recorded");

        match mode {
            StartMode::Interactive => {
                let exit = run_interactive(master, &process)?;
                tracing::info!(id = %record.identity, code = exit.code(), "container exited");
                if let Err(e) = layers.teardown() {
                    tracing::warn!(id = %record.identity, error = %e, "layer teardown after exit failed");
                }
                Ok(StartOutcome {
                    record,
                    exit: Some(exit),
                    keeper_pid: None,
                })
            }
            StartMode::Background => {
                let keeper = terminal::detach_drain(master)?;
                Ok(StartOutcome {
                    record,
                    exit: None,
                    keeper_pid: Some(keeper),
                })
            }
        }
    }

    fn launch_init(
        &self,
        id: &ContainerId,
        rootfs: &Path,
        command: &[String],
        pty: &Pty,
    ) -> Result<ContainerProcess> {
        let mut env = Environment::from_current();
        env.set(constants::ENV_ROOTFS, rootfs.to_string_lossy());
        env.set(constants::ENV_CONTAINER_ID, id.as_str());
        env.set(constants::ENV_DATA_DIR, self.config.data_dir.to_string_lossy());

        let mut args = vec![constants::BIN_NAME.to_string(), "child".to_string(), "--".to_string()];
        args.extend(command.iter().cloned());

        launch::launch(&LaunchSpec {
            program: self.launcher.clone(),
            args,
            env,
            namespaces: NamespaceConfig::default(),
            terminal: Some(pty.slave()),
        })
    }

    /// Looks up the record whose identity starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown or ambiguous prefix.
    pub fn resolve(&self, prefix: &str) -> Result<ContainerRecord> {
        let id = self.store.resolve(prefix)?;
        self.store.get(&id)
    }

    /// Kills the controlling process of a container.
    ///
    /// The record and layers are left for `remove` or `prune`.
    ///
    /// # Errors
    ///
    /// Returns a lookup error, or the kill error unless the process was
    /// already gone.
    pub fn stop(&self, prefix: &str) -> Result<(ContainerRecord, StopOutcome)> {
        let record = self.resolve(prefix)?;
        let outcome = match i32::try_from(record.controlling_pid) {
            Ok(raw) if raw > 0 => match kill(Pid::from_raw(raw), Signal::SIGKILL) {
                Ok(()) => StopOutcome::Killed,
                Err(Errno::ESRCH) => StopOutcome::AlreadyExited,
                Err(e) => return Err(HuskError::syscall("kill", raw, e)),
            },
            _ => StopOutcome::AlreadyExited,
        };
        tracing::info!(id = %record.identity, pid = record.controlling_pid, ?outcome, "stop");
        Ok((record, outcome))
    }

    /// Tears down a container's layers and deletes its record, regardless of
    /// whether it is still running.
    ///
    /// A record that no longer decodes is removed along with the layer set
    /// derived from its identity.
    ///
    /// # Errors
    ///
    /// Returns a lookup error, or [`HuskError::Cleanup`] if the layers could
    /// not be reclaimed; the record is then kept so the removal can be
    /// retried.
    pub fn remove(&self, prefix: &str) -> Result<ContainerId> {
        let id = self.store.resolve(prefix)?;
        match self.store.get(&id) {
            Ok(record) => self.reclaim(&record)?,
            Err(HuskError::Serialization { source }) => {
                tracing::warn!(id = %id, error = %source, "record unreadable");
                self.reclaim_unreadable(&id)?;
            }
            Err(e) => return Err(e),
        }
        Ok(id)
    }

    /// Reclaims every container whose controlling process is gone, and every
    /// record that no longer decodes.
    ///
    /// Running containers are untouched. A failed reclaim is reported and
    /// does not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns an error only if the registry cannot be enumerated.
    pub fn prune(&self) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        for id in self.store.ids()? {
            match self.store.get(&id) {
                Ok(record) if self.procs.is_alive(record.controlling_pid) => {}
                Ok(record) => match self.reclaim(&record) {
                    Ok(()) => report.reclaimed.push(id),
                    Err(error) => report.left_in_place(id, error),
                },
                Err(HuskError::Serialization { source }) => match self.reclaim_unreadable(&id) {
                    Ok(()) => report.unreadable.push(CleanupAnomaly {
                        identity: id,
                        error: source.into(),
                    }),
                    Err(error) => report.left_in_place(id, error),
                },
                // Removed concurrently.
                Err(error) if error.is_lookup() => {}
                Err(error) => report.left_in_place(id, error),
            }
        }
        tracing::info!(
            reclaimed = report.reclaimed.len(),
            unreadable = report.unreadable.len(),
            anomalies = report.anomalies.len(),
            "prune complete"
        );
        Ok(report)
    }

    fn reclaim(&self, record: &ContainerRecord) -> Result<()> {
        let outcome = overlayfs::teardown(&record.root_path)?;
        tracing::debug!(id = %record.identity, ?outcome, "layers reclaimed");
        self.store.delete(&record.identity)
    }

    /// Without a record the merged root is unknown; the standard layout
    /// under the layer root is assumed.
    fn reclaim_unreadable(&self, id: &ContainerId) -> Result<()> {
        let outcome = LayerSet::for_container(&self.config.layer_root(), id).teardown()?;
        tracing::debug!(id = %id, ?outcome, "unreadable record reclaimed by identity");
        self.store.delete(id)
    }

    /// Records with their status at observation time.
    ///
    /// Without `show_all`, only running containers are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be enumerated.
    pub fn list(&self, show_all: bool) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|record| {
                let status = ContainerStatus::from_liveness(self.procs.is_alive(record.controlling_pid));
                ContainerSummary { record, status }
            })
            .filter(|summary| show_all || summary.status == ContainerStatus::Running)
            .collect())
    }
}

fn run_interactive(master: OwnedFd, process: &ContainerProcess) -> Result<ExitStatus> {
    let _raw = RawModeGuard::enter();
    let session = match InteractiveSession::attach(master) {
        Ok(session) => session,
        Err(e) => {
            let _ = process.kill();
            let _ = process.wait();
            return Err(e);
        }
    };
    let exit = process.wait();
    session.finish();
    exit
}

/// Releases a partially started container and returns the original error.
fn abandon(layers: &LayerSet, process: Option<&ContainerProcess>, err: HuskError) -> HuskError {
    if let Some(process) = process {
        if let Err(e) = process.kill() {
            tracing::warn!(pid = process.pid(), error = %e, "could not kill abandoned container");
        }
        let _ = process.wait();
    }
    if let Err(e) = layers.teardown() {
        tracing::warn!(error = %e, "could not reclaim layers of abandoned container");
    }
    err
}
