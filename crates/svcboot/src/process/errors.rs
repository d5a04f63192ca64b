//! Defines the error surface for daemon launch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while launching the daemon.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The path of the running executable could not be resolved.
    #[error("failed to resolve the current executable: {source}")]
    CurrentExe {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A relative path could not be made absolute.
    #[error("failed to make '{}' absolute: {source}", path.display())]
    AbsolutePath {
        /// Path as given.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The log directory could not be created.
    #[error("failed to create log directory '{}': {source}", path.display())]
    LogDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The log file could not be opened.
    #[error("failed to open log file '{}': {source}", path.display())]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The child process could not be spawned.
    #[error("failed to spawn '{}': {source}", program.display())]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the child process failed.
    #[error("failed to wait for '{}': {source}", program.display())]
    Wait {
        /// Program that was waited on.
        program: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
