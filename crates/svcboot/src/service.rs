//! Contracts between the bootstrapper and the application it hosts.

use crate::command::BoxedError;
use crate::flags::{FlagSet, FlagValues};

/// The long-running body supervised by the control plane.
///
/// `serve` runs on its own thread and may block until `close` is called.
/// `close` is the graceful shutdown hook; it is never called on forced
/// shutdown.
pub trait Service: Send + Sync {
    /// Runs the service.
    ///
    /// # Errors
    ///
    /// Returns any failure that should bring the process down.
    fn serve(&self) -> Result<(), BoxedError>;

    /// Releases resources and makes `serve` return.
    ///
    /// # Errors
    ///
    /// Returns failures while cleaning up; they are logged.
    fn close(&self) -> Result<(), BoxedError>;
}

/// Configuration object bound to one command's flags.
///
/// `register` runs while the command tree is built; `validate` runs after the
/// command's flags resolved and before the command does its work.
pub trait Configurator: Send {
    /// Adds this object's flags.
    fn register(&self, flags: FlagSet) -> FlagSet;

    /// Reads and checks resolved values.
    ///
    /// # Errors
    ///
    /// Returns a description of invalid configuration.
    fn validate(&mut self, values: &FlagValues) -> Result<(), BoxedError>;
}
