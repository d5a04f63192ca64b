//! Error types for the stop client.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use svcboot_wire::FrameError;

use crate::signals::{SignalError, signal_name};

/// Errors surfaced while asking a daemon to stop.
#[derive(Debug, Error)]
pub enum StopError {
    /// Nothing answers on the control socket.
    #[error("daemon is not running (no control socket at {})", path.display())]
    NotRunning {
        /// Socket path that was dialled.
        path: PathBuf,
    },
    /// Connecting to the control socket failed for another reason.
    #[error("failed to connect to control socket {}: {source}", path.display())]
    Connect {
        /// Socket path that was dialled.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Setting up the stream failed.
    #[error("control stream setup failed: {0}")]
    Io(#[from] io::Error),
    /// Writing a request or reading a response failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Installing signal handlers failed.
    #[error(transparent)]
    Signals(#[from] SignalError),
    /// The client gave up waiting after a termination signal.
    #[error("stop interrupted by {}; forced stop requested", signal_name(*signal))]
    Interrupted {
        /// Signal that interrupted the wait.
        signal: i32,
    },
}
