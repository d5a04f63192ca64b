//! Derives the on-disk locations shared by every command of one program.
//!
//! The `start`, internal run and `stop` commands must agree on where the
//! control socket lives and where the daemon writes its log, so both derive
//! them from the same [`BootPaths`] value and the program name.

use std::path::{Path, PathBuf};

use crate::defaults::{
    DEFAULT_CONFIG_FILE, DEFAULT_LOG_DIR, DEFAULT_RUNTIME_DIR, per_user_runtime_dir,
};
use crate::socket::SocketEndpoint;

/// Directory layout used to derive socket, log and config file paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPaths {
    runtime_dir: PathBuf,
    log_dir: PathBuf,
    config_dir: Option<PathBuf>,
    config_file_name: String,
}

impl Default for BootPaths {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            config_dir: None,
            config_file_name: DEFAULT_CONFIG_FILE.to_owned(),
        }
    }
}

impl BootPaths {
    /// Layout rooted in user-writable directories.
    ///
    /// Sockets and logs share the per-user runtime directory of `program`,
    /// which lets unprivileged users run daemons without touching `/var`.
    #[must_use]
    pub fn per_user(program: &str) -> Self {
        let base = per_user_runtime_dir(program);
        Self {
            log_dir: base.join("log"),
            runtime_dir: base,
            ..Self::default()
        }
    }

    /// Overrides the directory holding control sockets.
    #[must_use]
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Overrides the directory holding log files.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Overrides the directory the default config file is looked up in.
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Overrides the default config file name (including its extension).
    #[must_use]
    pub fn with_config_file_name(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = name.into();
        self
    }

    /// Directory holding control sockets.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Directory holding log files.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_path()
    }

    /// Control socket of `program`: `<runtime-dir>/<program>.sock`.
    #[must_use]
    pub fn socket_endpoint(&self, program: &str) -> SocketEndpoint {
        SocketEndpoint::unix(self.runtime_dir.join(format!("{program}.sock")))
    }

    /// Log file of `program`: `<log-dir>/<program>.log`.
    #[must_use]
    pub fn log_path(&self, program: &str) -> PathBuf {
        self.log_dir.join(format!("{program}.log"))
    }

    /// Default config file; relative to the working directory unless a
    /// config directory was configured.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        match &self.config_dir {
            Some(dir) => dir.join(&self.config_file_name),
            None => PathBuf::from(&self.config_file_name),
        }
    }
}
