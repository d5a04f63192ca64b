//! Error types for the control plane.

use std::io;

use thiserror::Error;

use svcboot_config::SocketPreparationError;

use crate::command::BoxedError;
use crate::signals::SignalError;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the socket failed.
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another process answers on the socket.
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// Something other than a socket occupies the path.
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Socket path.
        path: String,
    },
    /// Inspecting the existing path failed.
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing the existing socket failed unexpectedly.
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale socket file failed.
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept loop panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors surfaced by the control plane server.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The socket directory could not be prepared.
    #[error("failed to prepare control socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[source]
        source: SocketPreparationError,
    },
    /// Another instance owns the control socket.
    #[error("{name} is already running (socket {path} is in use)")]
    AlreadyRunning {
        /// Program name.
        name: String,
        /// Socket path.
        path: String,
    },
    /// The listener failed.
    #[error(transparent)]
    Listener(ListenerError),
    /// Installing signal handlers failed.
    #[error(transparent)]
    Signals(#[from] SignalError),
    /// A supervision thread could not be spawned.
    #[error("failed to spawn {role} thread: {source}")]
    Thread {
        /// Thread role.
        role: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The service body failed.
    #[error("service failed: {source}")]
    Service {
        /// Error returned by the service.
        #[source]
        source: BoxedError,
    },
}

impl From<SocketPreparationError> for ControlError {
    fn from(source: SocketPreparationError) -> Self {
        Self::Socket { source }
    }
}
