//! Ordered process environments and their snapshot encoding.
//!
//! A snapshot is stored as one `KEY=VALUE` per line; `/proc/<pid>/environ`
//! uses NUL separators. Both decode into the same [`Environment`].

use std::fmt::Write as _;

/// An ordered set of environment variables with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub const fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Captures the current process environment.
    #[must_use]
    pub fn from_current() -> Self {
        std::env::vars().collect()
    }

    /// Decodes a newline-separated snapshot. Blank lines are skipped.
    #[must_use]
    pub fn from_snapshot(text: &str) -> Self {
        Self::from_entries(text.split('\n'))
    }

    /// Decodes the NUL-separated contents of `/proc/<pid>/environ`.
    #[must_use]
    pub fn from_proc_environ(bytes: &[u8]) -> Self {
        Self::from_entries(String::from_utf8_lossy(bytes).split('\0'))
    }

    fn from_entries<'a>(entries: impl Iterator<Item = &'a str>) -> Self {
        entries
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (entry.to_string(), String::new()),
            })
            .collect()
    }

    /// Encodes the environment as a newline-separated snapshot.
    #[must_use]
    pub fn to_snapshot(&self) -> String {
        let mut out = String::new();
        for entry in self.entries() {
            let _ = writeln!(out, "{entry}");
        }
        out
    }

    /// Returns `KEY=VALUE` strings in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a variable, replacing any existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    /// Removes a variable if present.
    pub fn remove(&mut self, key: &str) {
        self.vars.retain(|(k, _)| k != key);
    }

    /// Iterates `(key, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_decoding_skips_blank_lines() {
        let env = Environment::from_snapshot("PATH=/bin\n\nHOME=/root\n");
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("PATH"), Some("/bin"));
        assert_eq!(env.get("HOME"), Some("/root"));
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let env = Environment::from_snapshot("OPTS=a=b=c\n");
        assert_eq!(env.get("OPTS"), Some("a=b=c"));
    }

    #[test]
    fn proc_environ_is_nul_separated() {
        let env = Environment::from_proc_environ(b"TERM=xterm\0USER=root\0\0");
        assert_eq!(env.entries(), vec!["TERM=xterm", "USER=root"]);
    }

    #[test]
    fn set_overrides_in_place() {
        let mut env = Environment::from_snapshot("A=1\nB=2\n");
        env.set("A", "9");
        env.set("C", "3");
        assert_eq!(env.entries(), vec!["A=9", "B=2", "C=3"]);
        env.remove("B");
        assert_eq!(env.to_snapshot(), "A=9\nC=3\n");
    }
}
