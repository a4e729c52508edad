//! Integration tests for the husk runtime.
//!
//! Exercise the registry, lifecycle, and inspection paths together against
//! a temporary data directory and a fabricated proc tree. Nothing here needs
//! privileges; tests that do live with the `husk` binary.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use husk_common::config::HuskConfig;
use husk_common::types::{ContainerId, ContainerStatus};
use husk_core::filesystem::overlayfs::LayerSet;
use husk_core::procfs::ProcessTable;
use husk_core::procfs::fixture::add_process;
use husk_image::layer::extract_layer;
use husk_image::manifest::ImageManifest;
use husk_runtime::container::ContainerRecord;
use husk_runtime::exec::resolve_environment;
use husk_runtime::lifecycle::LifecycleManager;
use husk_runtime::state::{ContainerStore, FileStore};
use husk_runtime::top::list_container_processes;

struct Fixture {
    data: tempfile::TempDir,
    proc: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            data: tempfile::tempdir().expect("data dir"),
            proc: tempfile::tempdir().expect("proc dir"),
        }
    }

    fn config(&self) -> HuskConfig {
        HuskConfig::new(self.data.path(), self.data.path().join("unpack"))
    }

    fn manager(&self) -> LifecycleManager {
        let config = self.config();
        let store = FileStore::open(config.state_dir()).expect("store");
        LifecycleManager::with_parts(
            config,
            Box::new(store),
            ProcessTable::new(self.proc.path()),
            PathBuf::from("/bin/false"),
        )
    }

    fn spawn_process(&self, pid: u32, ppid: u32, ns_pids: &[u32], pid_ns: &str, cmd: &[&str]) {
        add_process(self.proc.path(), pid, ppid, ns_pids, pid_ns, cmd).expect("fake process");
    }

    fn kill_process(&self, pid: u32) {
        std::fs::remove_dir_all(self.proc.path().join(pid.to_string())).expect("kill");
    }

    /// Registers a container whose layer set exists but is not mounted.
    fn register(&self, mgr: &LifecycleManager, id: &str, pid: u32) -> ContainerRecord {
        let identity = ContainerId::parse(id).expect("id");
        let layers = LayerSet::for_container(&self.config().layer_root(), &identity);
        for dir in [&layers.lower, &layers.upper, &layers.work, &layers.merged] {
            std::fs::create_dir_all(dir).expect("layer dir");
        }
        let record = ContainerRecord {
            identity,
            root_path: layers.merged,
            controlling_pid: pid,
        };
        mgr.store().put(&record).expect("put");
        record
    }
}

fn write_layer(path: &Path) {
    let mut builder = tar::Builder::new(std::fs::File::create(path).expect("archive"));
    let body = b"#!/bin/sh\necho hi\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "bin/hello", &body[..])
        .expect("append");
    builder.finish().expect("finish");
}

#[test]
fn manifest_lookup_feeds_layer_extraction() {
    let fx = Fixture::new();
    let config = fx.config();
    std::fs::create_dir_all(config.image_dir.join("abc123")).expect("image dir");
    write_layer(&config.image_dir.join("abc123/layer.tar"));
    std::fs::write(
        config.manifest_path(),
        r#"[{"Config":"c.json","RepoTags":["alpine:latest"],"Layers":["abc123/layer.tar"]}]"#,
    )
    .expect("manifest");

    let manifest = ImageManifest::load(&config.manifest_path()).expect("load");
    let archive = manifest.base_layer("alpine:latest").expect("tag");
    let id = ContainerId::generate();
    let layers = LayerSet::for_container(&config.layer_root(), &id);
    let extracted = extract_layer(&archive, &layers.lower).expect("extract");

    assert_eq!(extracted.entries, 1);
    assert!(layers.lower.join("bin/hello").is_file());
}

#[test]
fn ps_then_prune_reflect_controlling_process_liveness() {
    let fx = Fixture::new();
    let mgr = fx.manager();
    fx.spawn_process(4000, 1, &[4000, 1], "pid:[401]", &["/bin/sh"]);
    fx.spawn_process(5000, 1, &[5000, 1], "pid:[501]", &["/bin/sh"]);
    let first = fx.register(&mgr, "aaaaaaaaaaaa", 4000);
    let second = fx.register(&mgr, "bbbbbbbbbbbb", 5000);

    assert_eq!(mgr.list(false).expect("ps").len(), 2);

    fx.kill_process(4000);
    let running = mgr.list(false).expect("ps");
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].record, second);
    let all = mgr.list(true).expect("ps -a");
    let exited = all
        .iter()
        .find(|s| s.record.identity == first.identity)
        .expect("exited entry");
    assert_eq!(exited.status, ContainerStatus::Exited);

    let report = mgr.prune().expect("prune");
    assert_eq!(report.reclaimed, vec![first.identity.clone()]);
    assert!(report.anomalies.is_empty());
    assert!(!first.root_path.exists());
    assert!(second.root_path.exists());

    let state = fx.config().state_dir();
    assert!(!state.join("container_aaaaaaaaaaaa.json").exists());
    assert!(state.join("container_bbbbbbbbbbbb.json").exists());
}

#[test]
fn prefix_lookup_through_the_file_store() {
    let fx = Fixture::new();
    let mgr = fx.manager();
    let _ = fx.register(&mgr, "abc111111111", 0);
    let _ = fx.register(&mgr, "abc222222222", 0);

    assert!(mgr.resolve("abc").expect_err("ambiguous").is_lookup());
    assert!(mgr.resolve("fff").expect_err("unknown").is_lookup());
    assert_eq!(
        mgr.resolve("ABC2").expect("case-insensitive").identity.as_str(),
        "abc222222222"
    );
}

#[test]
fn top_and_exec_environment_for_a_registered_container() {
    let fx = Fixture::new();
    let mgr = fx.manager();
    fx.spawn_process(6000, 10, &[6000, 1], "pid:[601]", &["/bin/sh"]);
    fx.spawn_process(6001, 6000, &[6001, 2], "pid:[601]", &["top", "-b"]);
    fx.spawn_process(7000, 1, &[7000], "pid:[1]", &["sshd"]);
    let record = fx.register(&mgr, "cccccccccccc", 6000);
    std::fs::write(
        fx.proc.path().join("6000/environ"),
        b"PATH=/bin:/usr/bin\0TERM=xterm\0",
    )
    .expect("environ");

    let rows = list_container_processes(mgr.procs(), &record).expect("top");
    assert_eq!(rows.len(), 2);
    let child = rows.iter().find(|r| r.host_pid == 6001).expect("child row");
    assert_eq!((child.ns_pid, child.ns_ppid), (Some(2), Some(1)));
    assert_eq!(child.command, "top -b");

    let env = resolve_environment(mgr.store(), mgr.procs(), &record);
    assert_eq!(env.get("PATH"), Some("/bin:/usr/bin"));
}

#[test]
fn remove_is_unconditional_and_idempotent_on_layers() {
    let fx = Fixture::new();
    let mgr = fx.manager();
    fx.spawn_process(8000, 1, &[8000, 1], "pid:[801]", &["/bin/sh"]);
    let record = fx.register(&mgr, "dddddddddddd", 8000);

    let removed = mgr.remove("dd").expect("rm");
    assert_eq!(removed, record.identity);
    assert!(!record.root_path.parent().expect("base").exists());
    assert!(mgr.remove("dd").expect_err("gone").is_lookup());
}
