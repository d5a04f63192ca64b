//! Bootstrapping for long-running services.
//!
//! `svcboot` turns a [`Service`] into a command-line program with a fixed
//! lifecycle surface:
//!
//! - `start` serves in the foreground, or with `--daemon` re-executes the
//!   binary as a detached process that logs to a file;
//! - `stop` asks the running daemon to shut down over a local Unix socket and
//!   escalates to a forced stop when interrupted;
//! - custom subcommands sit beside them in the same [`Command`] tree.
//!
//! Every command resolves its flags in layers: the command line first, then
//! environment variables derived from flag names, then a config file. See
//! [`resolve`] for the rules.
//!
//! The running daemon is supervised by a [`ControlPlane`]: the first `Stop`
//! request or termination signal runs the service's shutdown hook, and any
//! later one forces the process down without it.

mod app;
pub mod command;
pub mod control;
pub mod flags;
pub mod process;
pub mod resolve;
mod service;
pub mod signals;
pub mod stop;
pub mod telemetry;

pub use app::{
    Boot, BootBuilder, BootError, CommandConfig, RESERVED_COMMANDS, START_COMMAND, STOP_COMMAND,
};
pub use command::{ActionError, BoxedError, Command, CommandError, Invocation, RunContext};
pub use control::{ControlError, ControlPlane, ShutdownOutcome};
pub use flags::{FlagSet, FlagValues, ValueOrigin};
pub use resolve::{ResolveError, ResolveOption, SharedPath};
pub use service::{Configurator, Service};
pub use stop::{StopClient, StopError, StopOutcome, StopSummary};

pub use svcboot_config::{BootPaths, LogFormat, SocketEndpoint};

#[cfg(test)]
mod tests;
