//! Running additional commands inside a live container.
//!
//! Two entry paths exist. The helper path delegates namespace entry and the
//! change of root to `nsenter`. The direct path re-invokes this binary as
//! `attach-child`, which joins each namespace itself; keeping that in a
//! separate process leaves the caller's own namespaces and root untouched.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use husk_common::constants;
use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};
use husk_common::types::ContainerId;
use husk_core::command::resolve_program;
use husk_core::namespace::NamespaceKind;
use husk_core::namespace::join::{enter_root, join_namespaces};
use husk_core::procfs::ProcessTable;

use crate::container::ContainerRecord;
use crate::state::ContainerStore;

/// How to enter a container's namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPath {
    /// Delegate to the namespace-entry helper at this path.
    Helper(PathBuf),
    /// Join each namespace from a re-invoked `attach-child` process.
    Direct,
}

impl EntryPath {
    /// Prefers the helper unless `force_direct` is set or it is not installed.
    #[must_use]
    pub fn select(force_direct: bool) -> Self {
        if force_direct {
            return Self::Direct;
        }
        match which::which(constants::NSENTER_BIN) {
            Ok(path) => Self::Helper(path),
            Err(e) => {
                tracing::warn!(helper = constants::NSENTER_BIN, error = %e, "helper not found, joining namespaces directly");
                Self::Direct
            }
        }
    }

    /// Selects the path honouring `HUSK_EXEC_USE_NSENTER=0`.
    #[must_use]
    pub fn from_env() -> Self {
        let force_direct = std::env::var(constants::ENV_EXEC_USE_NSENTER).is_ok_and(|v| v == "0");
        Self::select(force_direct)
    }
}

/// Environment for commands entering `record`.
///
/// The snapshot taken at start wins; otherwise the controlling process's
/// current environment is used; otherwise the environment is empty.
#[must_use]
pub fn resolve_environment(
    store: &dyn ContainerStore,
    procs: &ProcessTable,
    record: &ContainerRecord,
) -> Environment {
    match store.environment(&record.identity) {
        Ok(Some(env)) => return env,
        Ok(None) => tracing::debug!(id = %record.identity, "no environment snapshot"),
        Err(e) => tracing::warn!(id = %record.identity, error = %e, "environment snapshot unreadable"),
    }
    match procs.environ(record.controlling_pid) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(pid = record.controlling_pid, error = %e, "process environment unreadable, using empty environment");
            Environment::new()
        }
    }
}

/// Arguments for the namespace-entry helper.
#[must_use]
pub fn helper_args(record: &ContainerRecord, command: &[String]) -> Vec<String> {
    let mut args = vec![
        "--target".to_string(),
        record.controlling_pid.to_string(),
        "--mount".to_string(),
        "--uts".to_string(),
        "--ipc".to_string(),
        "--net".to_string(),
        "--pid".to_string(),
        "--preserve-credentials".to_string(),
        "--".to_string(),
        "chroot".to_string(),
        record.root_path.to_string_lossy().into_owned(),
    ];
    args.extend(command.iter().cloned());
    args
}

/// Enters containers located through the registry.
#[derive(Clone, Copy)]
pub struct Attacher<'a> {
    store: &'a dyn ContainerStore,
    procs: &'a ProcessTable,
    launcher: &'a Path,
    data_dir: &'a Path,
}

impl<'a> Attacher<'a> {
    /// Creates an attacher over a registry and process table.
    ///
    /// `launcher` is the binary re-invoked for the direct path, and
    /// `data_dir` the registry root it is told to open.
    #[must_use]
    pub fn new(
        store: &'a dyn ContainerStore,
        procs: &'a ProcessTable,
        launcher: &'a Path,
        data_dir: &'a Path,
    ) -> Self {
        Self {
            store,
            procs,
            launcher,
            data_dir,
        }
    }

    /// Runs `command` inside the container matching `prefix` and returns its
    /// exit code. Standard streams are inherited.
    ///
    /// # Errors
    ///
    /// Returns a lookup error, an error if the container is not running, or
    /// an error if the entry process cannot be spawned.
    pub fn exec(&self, prefix: &str, command: &[String], path: &EntryPath) -> Result<i32> {
        let program = require_command(command)?;
        let id = self.store.resolve(prefix)?;
        let record = self.store.get(&id)?;
        if !self.procs.is_alive(record.controlling_pid) {
            return Err(not_running(&record));
        }

        let mut cmd = match path {
            EntryPath::Helper(helper) => {
                let env = resolve_environment(self.store, self.procs, &record);
                let mut cmd = Command::new(helper);
                let _ = cmd.args(helper_args(&record, command)).env_clear().envs(env.iter());
                cmd
            }
            EntryPath::Direct => {
                let mut cmd = Command::new(self.launcher);
                let _ = cmd
                    .arg("attach-child")
                    .arg(record.identity.as_str())
                    .arg("--")
                    .args(command)
                    .env(constants::ENV_DATA_DIR, self.data_dir);
                cmd
            }
        };
        tracing::info!(id = %record.identity, pid = record.controlling_pid, ?path, program, "exec");
        run_to_completion(&mut cmd)
    }

    /// Joins the namespaces of container `id`, changes into its root, and
    /// runs `command` there as a child, returning its exit code.
    ///
    /// Changes the calling process's namespaces and root irreversibly; meant
    /// for a dedicated process. Namespace joins are best effort, so a
    /// partially joined command still runs.
    ///
    /// # Errors
    ///
    /// Returns a lookup error, an error if the change of root fails, or an
    /// error if the command cannot be found or spawned.
    pub fn attach(&self, id: &ContainerId, command: &[String]) -> Result<i32> {
        let program = require_command(command)?;
        let record = self.store.get(id)?;
        let env = resolve_environment(self.store, self.procs, &record);

        let report = join_namespaces(self.procs.root(), record.controlling_pid, &NamespaceKind::JOIN_ORDER);
        if !report.all_joined() {
            tracing::warn!(id = %record.identity, failed = ?report.failed(), "continuing with partial namespace membership");
        }
        enter_root(&record.root_path)?;

        let resolved = resolve_program(program, &env, Path::new("/")).ok_or_else(|| HuskError::NotFound {
            kind: "command",
            id: program.to_string(),
        })?;
        let mut cmd = Command::new(resolved);
        let _ = cmd.args(&command[1..]).env_clear().envs(env.iter());
        run_to_completion(&mut cmd)
    }
}

fn require_command(command: &[String]) -> Result<&str> {
    command.first().map(String::as_str).ok_or_else(|| HuskError::Config {
        message: "no command given to run in the container".into(),
    })
}

fn not_running(record: &ContainerRecord) -> HuskError {
    HuskError::NotFound {
        kind: "running container",
        id: record.identity.to_string(),
    }
}

fn run_to_completion(cmd: &mut Command) -> Result<i32> {
    let program = PathBuf::from(cmd.get_program());
    let status = cmd.status().map_err(|e| HuskError::io(&program, e))?;
    Ok(status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FileStore;

    fn record(pid: u32) -> ContainerRecord {
        ContainerRecord {
            identity: ContainerId::parse("0123456789ab").expect("id"),
            root_path: PathBuf::from("/var/lib/husk/layers/0123456789ab/merged"),
            controlling_pid: pid,
        }
    }

    #[test]
    fn helper_enters_all_namespaces_then_chroots() {
        let args = helper_args(&record(4242), &["/bin/echo".into(), "hi".into()]);
        assert_eq!(
            args,
            [
                "--target",
                "4242",
                "--mount",
                "--uts",
                "--ipc",
                "--net",
                "--pid",
                "--preserve-credentials",
                "--",
                "chroot",
                "/var/lib/husk/layers/0123456789ab/merged",
                "/bin/echo",
                "hi",
            ]
        );
    }

    #[test]
    fn forced_direct_path_skips_helper_lookup() {
        assert_eq!(EntryPath::select(true), EntryPath::Direct);
    }

    #[test]
    fn environment_prefers_snapshot_over_proc() {
        let state = tempfile::tempdir().expect("state");
        let proc = tempfile::tempdir().expect("proc");
        let store = FileStore::open(state.path()).expect("store");
        let rec = record(50);
        std::fs::create_dir(proc.path().join("50")).expect("pid dir");
        std::fs::write(proc.path().join("50/environ"), b"FROM=proc\0").expect("environ");
        let procs = ProcessTable::new(proc.path());

        let env = resolve_environment(&store, &procs, &rec);
        assert_eq!(env.get("FROM"), Some("proc"));

        std::fs::write(store.environment_path(&rec.identity), "FROM=snapshot\n").expect("snapshot");
        let env = resolve_environment(&store, &procs, &rec);
        assert_eq!(env.get("FROM"), Some("snapshot"));
    }

    #[test]
    fn environment_falls_back_to_empty() {
        let state = tempfile::tempdir().expect("state");
        let store = FileStore::open(state.path()).expect("store");
        let procs = ProcessTable::new(state.path().join("no-proc"));
        assert!(resolve_environment(&store, &procs, &record(50)).is_empty());
    }

    #[test]
    fn exec_into_dead_container_is_refused() {
        let state = tempfile::tempdir().expect("state");
        let proc = tempfile::tempdir().expect("proc");
        let store = FileStore::open(state.path()).expect("store");
        store.put(&record(50)).expect("put");
        let procs = ProcessTable::new(proc.path());

        let err = Attacher::new(&store, &procs, Path::new("/bin/false"), state.path())
            .exec("0123", &["/bin/true".into()], &EntryPath::Direct)
            .expect_err("not running");
        assert!(matches!(err, HuskError::NotFound { kind: "running container", .. }));
    }

    #[test]
    fn exec_requires_a_command() {
        let state = tempfile::tempdir().expect("state");
        let store = FileStore::open(state.path()).expect("store");
        let procs = ProcessTable::default();
        let err = Attacher::new(&store, &procs, Path::new("/bin/false"), state.path())
            .exec("0123", &[], &EntryPath::Direct)
            .expect_err("empty");
        assert!(matches!(err, HuskError::Config { .. }));
    }

    #[test]
    fn entry_process_exit_code_is_propagated() {
        let state = tempfile::tempdir().expect("state");
        let proc = tempfile::tempdir().expect("proc");
        let store = FileStore::open(state.path()).expect("store");
        store.put(&record(50)).expect("put");
        std::fs::create_dir(proc.path().join("50")).expect("pid dir");
        let procs = ProcessTable::new(proc.path());

        let code = Attacher::new(&store, &procs, Path::new("/bin/false"), state.path())
            .exec("0123", &["ignored".into()], &EntryPath::Direct)
            .expect("spawn");
        assert_eq!(code, 1);
    }

    #[test]
    fn direct_path_points_the_child_at_the_same_registry() {
        use std::os::unix::fs::PermissionsExt;

        let data = tempfile::tempdir().expect("data");
        let proc = tempfile::tempdir().expect("proc");
        let store = FileStore::open(data.path().join("state")).expect("store");
        store.put(&record(50)).expect("put");
        std::fs::create_dir(proc.path().join("50")).expect("pid dir");
        let procs = ProcessTable::new(proc.path());

        // Stands in for the husk binary and records how it was invoked.
        let launcher = data.path().join("launcher.sh");
        std::fs::write(
            &launcher,
            "#!/bin/sh\nprintf '%s\\n' \"$HUSK_DATA_DIR\" \"$@\" > \"$0.out\"\n",
        )
        .expect("launcher");
        std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let code = Attacher::new(&store, &procs, &launcher, data.path())
            .exec("0123", &["/bin/echo".into(), "hi".into()], &EntryPath::Direct)
            .expect("spawn");
        assert_eq!(code, 0);

        let seen = std::fs::read_to_string(data.path().join("launcher.sh.out")).expect("invocation");
        let data_dir = data.path().to_str().expect("utf-8 path");
        assert_eq!(
            seen.lines().collect::<Vec<_>>(),
            [data_dir, "attach-child", "0123456789ab", "--", "/bin/echo", "hi"]
        );
    }
}
