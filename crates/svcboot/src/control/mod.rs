//! Local control plane of a running daemon.
//!
//! The server binds a Unix socket, answers `Stop` requests framed as JSON
//! lines and drives a graceful/forced shutdown state machine that OS signals
//! feed as well.

mod errors;
mod handler;
mod listener;
mod reporter;
mod server;
mod shutdown;

use std::time::Duration;

pub use self::errors::{ControlError, ListenerError};
pub use self::handler::{ConnectionTracker, StopHandler, StopMessages, TrackerGuard};
pub use self::listener::{ConnectionHandler, ListenerHandle, SocketListener};
pub use self::reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use self::server::ControlPlane;
pub use self::shutdown::{GracefulAck, ShutdownController, ShutdownOutcome, Trigger, TriggerQueues};

pub(crate) const CONTROL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::control");

/// Upper bound on waiting for connection handlers to flush final replies.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
