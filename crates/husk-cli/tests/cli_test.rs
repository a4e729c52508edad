//! Tests driving the `husk` binary.
//!
//! The unprivileged tests cover the registry commands against a temporary
//! data directory, empty or seeded with hand-written records. The ignored test needs root and an unpacked image whose
//! directory is given in `HUSK_TEST_IMAGE_DIR` and tagged `HUSK_TEST_IMAGE`
//! (default `alpine:latest`).

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::process::{Command, Output};

fn husk(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_husk"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env("RUST_LOG", "off")
        .env_remove("HUSK_DATA_DIR")
        .env_remove("HUSK_IMAGE_DIR")
        .output()
        .expect("run husk")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn ps_on_empty_registry_prints_header() {
    let data = tempfile::tempdir().expect("tempdir");
    let out = husk(data.path(), &["ps", "-a"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "CONTAINER ID  PID  STATUS  ROOTFS\n");
    assert!(data.path().join("containers").is_dir());
}

#[test]
fn prune_on_empty_registry_reclaims_nothing() {
    let data = tempfile::tempdir().expect("tempdir");
    let out = husk(data.path(), &["prune"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "Reclaimed 0 container(s)\n");
}

#[test]
fn lookups_of_unknown_containers_fail() {
    let data = tempfile::tempdir().expect("tempdir");
    for args in [
        &["stop", "abc"][..],
        &["rm", "abc"],
        &["top", "abc"],
        &["exec", "abc", "/bin/true"],
    ] {
        let out = husk(data.path(), args);
        assert!(!out.status.success(), "{args:?} should fail");
    }
}

/// Stores a record for `id` whose controlling process is this test binary.
fn register_self(data_dir: &Path, id: &str, root: &Path) {
    let state = data_dir.join("containers");
    std::fs::create_dir_all(&state).expect("state dir");
    std::fs::write(
        state.join(format!("container_{id}.json")),
        format!(
            r#"{{"identity":"{id}","root_path":"{}","controlling_pid":{}}}"#,
            root.display(),
            std::process::id()
        ),
    )
    .expect("record");
}

#[test]
fn direct_exec_child_reads_the_callers_registry() {
    let data = tempfile::tempdir().expect("tempdir");
    let root = data.path().join("root");
    std::fs::create_dir(&root).expect("root");
    register_self(data.path(), "0123456789ab", &root);

    let out = Command::new(env!("CARGO_BIN_EXE_husk"))
        .arg("--data-dir")
        .arg(data.path())
        .args(["exec", "0123", "/bin/true"])
        .env("RUST_LOG", "off")
        .env("HUSK_EXEC_USE_NSENTER", "0")
        .env_remove("HUSK_DATA_DIR")
        .output()
        .expect("run husk");

    // Entering the fake root fails for different reasons with and without
    // privileges, but only after the child has found the record.
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(!out.status.success());
    assert!(!stderr.contains("container record not found"), "{stderr}");
    assert!(stderr.contains("entering container 0123456789ab"), "{stderr}");
    assert!(
        stderr.contains(&root.display().to_string()) || stderr.contains("/bin/true"),
        "{stderr}"
    );
}

#[test]
fn rm_discards_a_truncated_record() {
    let data = tempfile::tempdir().expect("tempdir");
    let state = data.path().join("containers");
    std::fs::create_dir_all(&state).expect("state dir");
    std::fs::write(state.join("container_0123456789ab.json"), r#"{"identity":"0123456789ab""#).expect("record");
    std::fs::write(state.join("container_0123456789ab.env"), "PATH=/bin\n").expect("snapshot");

    let out = husk(data.path(), &["rm", "0123"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout(&out), "0123456789ab\n");
    assert_eq!(std::fs::read_dir(&state).expect("state dir").count(), 0);
    assert!(!husk(data.path(), &["rm", "0123"]).status.success());
}

#[test]
fn run_with_unknown_image_fails_and_records_nothing() {
    let data = tempfile::tempdir().expect("tempdir");
    let images = data.path().join("unpack");
    std::fs::create_dir_all(&images).expect("image dir");
    std::fs::write(images.join("manifest.json"), "[]").expect("manifest");

    let out = husk(
        data.path(),
        &["--image-dir", images.to_str().expect("utf8"), "run", "nope:latest", "/bin/sh"],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("nope:latest"));
    let records = std::fs::read_dir(data.path().join("containers")).expect("state dir");
    assert_eq!(records.count(), 0);
}

#[test]
#[ignore = "requires root and an unpacked image in HUSK_TEST_IMAGE_DIR"]
fn daemon_lifecycle_end_to_end() {
    let image_dir = std::env::var("HUSK_TEST_IMAGE_DIR").expect("HUSK_TEST_IMAGE_DIR");
    let tag = std::env::var("HUSK_TEST_IMAGE").unwrap_or_else(|_| "alpine:latest".into());
    let data = tempfile::tempdir().expect("tempdir");

    let out = husk(
        data.path(),
        &["--image-dir", &image_dir, "run", "--daemon", &tag, "/bin/sh"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let id = stdout(&out).lines().next().expect("identity").to_string();
    assert_eq!(id.len(), 12);

    let ps = stdout(&husk(data.path(), &["ps"]));
    assert!(ps.contains(&id) && ps.contains("Running"));

    let exec = husk(data.path(), &["exec", &id[..6], "/bin/echo", "hi"]);
    assert!(exec.status.success());
    assert_eq!(stdout(&exec), "hi\n");

    let top = stdout(&husk(data.path(), &["top", &id]));
    assert!(top.lines().skip(1).any(|l| l.starts_with("1 ")));

    assert!(husk(data.path(), &["stop", &id]).status.success());
    std::thread::sleep(std::time::Duration::from_millis(200));
    let all = stdout(&husk(data.path(), &["ps", "-a"]));
    assert!(all.contains("Exited"));

    let prune = stdout(&husk(data.path(), &["prune"]));
    assert!(prune.contains(&id));
    assert!(!data.path().join("layers").join(&id).exists());
}
