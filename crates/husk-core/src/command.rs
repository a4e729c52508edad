//! Command-line and environment preparation for `execve(2)`.

use std::ffi::CString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use husk_common::env::Environment;
use husk_common::error::{HuskError, Result};

/// Converts strings into NUL-terminated C strings.
///
/// # Errors
///
/// Returns an error if any item contains an interior NUL byte.
pub fn to_cstrings<I, S>(items: I) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| {
            CString::new(item.as_ref()).map_err(|_| HuskError::Config {
                message: format!("argument contains a NUL byte: {:?}", item.as_ref()),
            })
        })
        .collect()
}

/// Encodes an environment as `KEY=VALUE` C strings.
///
/// # Errors
///
/// Returns an error if a variable contains an interior NUL byte.
pub fn env_cstrings(env: &Environment) -> Result<Vec<CString>> {
    to_cstrings(env.entries())
}

/// Resolves `program` the way a shell would, against `PATH` from `env`.
///
/// Names containing `/` are returned unchanged. Bare names are searched in
/// each `PATH` directory below `root` and returned as paths relative to
/// that root, so the result is valid after changing root to it.
#[must_use]
pub fn resolve_program(program: &str, env: &Environment, root: &Path) -> Option<PathBuf> {
    if program.contains('/') {
        return Some(PathBuf::from(program));
    }
    let search = env.get("PATH")?;
    search
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| {
            let on_disk = root.join(candidate.strip_prefix("/").unwrap_or(candidate));
            std::fs::metadata(on_disk)
                .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(root: &Path, rel: &str, mode: u32) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, b"#!/bin/true").expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).expect("chmod");
    }

    fn env(path: &str) -> Environment {
        Environment::from_snapshot(&format!("PATH={path}\n"))
    }

    #[test]
    fn explicit_paths_are_untouched() {
        let root = tempfile::tempdir().expect("tempdir");
        let found = resolve_program("/bin/echo", &Environment::new(), root.path());
        assert_eq!(found, Some(PathBuf::from("/bin/echo")));
    }

    #[test]
    fn bare_names_search_path_inside_root() {
        let root = tempfile::tempdir().expect("tempdir");
        install(root.path(), "usr/bin/sh", 0o755);

        let found = resolve_program("sh", &env("/bin:/usr/bin"), root.path());
        assert_eq!(found, Some(PathBuf::from("/usr/bin/sh")));
    }

    #[test]
    fn non_executable_files_are_skipped() {
        let root = tempfile::tempdir().expect("tempdir");
        install(root.path(), "bin/tool", 0o644);
        install(root.path(), "sbin/tool", 0o755);

        let found = resolve_program("tool", &env("/bin:/sbin"), root.path());
        assert_eq!(found, Some(PathBuf::from("/sbin/tool")));
    }

    #[test]
    fn missing_path_variable_resolves_nothing() {
        let root = tempfile::tempdir().expect("tempdir");
        assert_eq!(resolve_program("sh", &Environment::new(), root.path()), None);
    }

    #[test]
    fn interior_nul_is_rejected() {
        assert!(to_cstrings(["ok", "bad\0arg"]).is_err());
        assert_eq!(to_cstrings(["a", "b"]).expect("valid").len(), 2);
    }
}
