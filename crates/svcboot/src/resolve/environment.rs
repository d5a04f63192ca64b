//! Environment access and variable naming.

use std::collections::HashMap;

/// Source of environment variables consulted during resolution.
pub trait Environment {
    /// Value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory environment, mostly useful in tests.
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    /// Builds an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnvironment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Environment for MapEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Derives the variable name for a flag.
///
/// The flag name is upper-cased and `-`, `.` and `/` become `_`. A non-empty
/// prefix is upper-cased and joined with `_`.
#[must_use]
pub fn env_key(prefix: Option<&str>, flag: &str) -> String {
    let key: String = flag
        .chars()
        .map(|ch| match ch {
            '-' | '.' | '/' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}_{key}", prefix.to_ascii_uppercase()),
        _ => key,
    }
}
