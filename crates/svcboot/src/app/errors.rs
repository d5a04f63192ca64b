//! Errors raised while assembling and running a boot application.

use thiserror::Error;

use crate::command::BoxedError;
use crate::control::ControlError;
use crate::process::LaunchError;
use crate::stop::StopError;
use crate::telemetry::TelemetryError;

/// Errors surfaced by [`crate::app::Boot`].
#[derive(Debug, Error)]
pub enum BootError {
    /// A custom command tried to take a built-in name.
    #[error("{name} is a reserved command name")]
    ReservedCommand {
        /// Offending command name.
        name: String,
    },
    /// A configurator rejected its resolved values.
    #[error("invalid configuration: {source}")]
    Config {
        /// Error returned by the configurator.
        #[source]
        source: BoxedError,
    },
    /// The daemon launcher child exited unsuccessfully.
    #[error("daemon launcher exited with status {}", code.map_or_else(|| "signal".to_owned(), |code| code.to_string()))]
    ChildExited {
        /// Raw exit code, `None` when killed by a signal.
        code: Option<i32>,
    },
    /// Launching the daemon failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// The control plane failed.
    #[error(transparent)]
    Control(#[from] ControlError),
    /// The stop request failed.
    #[error(transparent)]
    Stop(#[from] StopError),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}
