//! Built-in directory, file and logging defaults.

use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use nix::unistd::geteuid;

/// System-wide directory holding control sockets.
pub const DEFAULT_RUNTIME_DIR: &str = "/var/run";

/// System-wide directory holding daemon log files.
pub const DEFAULT_LOG_DIR: &str = "/var/log";

/// File name of the configuration file read by the `start` command.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Suffix appended to the program name to form the internal re-exec command.
pub const INTERNAL_RUN_SUFFIX: &str = "boot-in-daemon";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Name of the hidden command a daemonised `start` re-executes into.
///
/// The name is derived from the program name so it never collides with a
/// caller-supplied subcommand.
#[must_use]
pub fn internal_command_name(program: &str) -> String {
    format!("{program}-{INTERNAL_RUN_SUFFIX}")
}

/// Base directory for per-user runtime artefacts of `program`.
///
/// Prefers `$XDG_RUNTIME_DIR/<program>`; otherwise falls back to a directory
/// under the system temporary directory namespaced by the effective uid.
#[must_use]
pub fn per_user_runtime_dir(program: &str) -> PathBuf {
    per_user_runtime_dir_inner(program)
}

#[cfg(unix)]
fn per_user_runtime_dir_inner(program: &str) -> PathBuf {
    if let Some(mut dir) = runtime_dir() {
        dir.push(program);
        return dir;
    }
    let mut dir = env::temp_dir();
    dir.push(program);
    dir.push(user_namespace());
    dir
}

#[cfg(not(unix))]
fn per_user_runtime_dir_inner(program: &str) -> PathBuf {
    let mut dir = env::temp_dir();
    dir.push(program);
    dir
}

#[cfg(unix)]
fn user_namespace() -> String {
    format!("uid-{}", geteuid().as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_command_name_is_derived_from_program() {
        assert_eq!(internal_command_name("gin"), "gin-boot-in-daemon");
    }

    #[test]
    fn per_user_runtime_dir_ends_with_program_or_namespace() {
        let dir = per_user_runtime_dir("svc");
        let rendered = dir.display().to_string();
        assert!(
            rendered.ends_with("svc") || rendered.contains("uid-"),
            "unexpected runtime directory {rendered}"
        );
    }
}
