//! Unix socket listener for the control plane.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use svcboot_config::SocketEndpoint;

use super::{CONTROL_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: UnixStream);
}

/// Listener bound to the control socket.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: UnixListener,
}

impl SocketListener {
    /// Binds the endpoint, removing a stale socket file nobody answers on.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::UnixInUse`] when another process answers on
    /// the socket, and other variants for filesystem failures.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = bind_unix(endpoint.path())?;
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Endpoint the listener is bound to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Starts the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NonBlocking`] when the socket cannot be
    /// switched to non-blocking mode.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        if let Err(source) = self.listener.set_nonblocking(true) {
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &shutdown_flag, &handler));
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit and the socket file to be removed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the loop panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    debug!(
        target: CONTROL_TARGET,
        endpoint = %listener.endpoint,
        "control socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener.listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let handler = Arc::clone(handler);
                thread::spawn(move || handler.handle(stream));
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: CONTROL_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    cleanup_unix_socket(&listener.endpoint);
}

fn accept_connection(listener: &UnixListener) -> Result<Option<UnixStream>, io::Error> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
            path: path.display().to_string(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::UnixNotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::UnixConnect {
                    path: path.display().to_string(),
                    source: error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    if let Err(error) = fs::remove_file(endpoint.path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: CONTROL_TARGET,
            error = %error,
            path = %endpoint.path().display(),
            "failed to remove unix socket file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ConnectionHandler for CountingHandler {
        fn handle(&self, _stream: UnixStream) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn accepts_connections_and_removes_socket_on_shutdown() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("app.sock");
        let endpoint = SocketEndpoint::unix(&path);
        let listener = SocketListener::bind(&endpoint).expect("bind listener");
        let count = Arc::new(AtomicUsize::new(0));
        let handle = listener
            .start(Arc::new(CountingHandler {
                count: Arc::clone(&count),
            }))
            .expect("start listener");

        UnixStream::connect(&path).expect("connect first client");
        UnixStream::connect(&path).expect("connect second client");

        assert!(wait_for_count(&count, 2), "expected two connections");
        handle.shutdown();
        handle.join().expect("join listener");
        assert!(!path.exists(), "listener should remove unix socket on shutdown");
    }

    #[test]
    fn cleans_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("app.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let listener = SocketListener::bind(&SocketEndpoint::unix(&path)).expect("bind new listener");
        drop(listener);
    }

    #[test]
    fn rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("app.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let error = SocketListener::bind(&SocketEndpoint::unix(&path)).expect_err("should fail bind");
        assert!(matches!(error, ListenerError::UnixInUse { .. }));
    }

    #[test]
    fn rejects_paths_that_are_not_sockets() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("app.sock");
        fs::write(&path, b"not a socket").expect("write file");

        let error = SocketListener::bind(&SocketEndpoint::unix(&path)).expect_err("should fail bind");
        assert!(matches!(error, ListenerError::UnixNotSocket { .. }));
    }
}
