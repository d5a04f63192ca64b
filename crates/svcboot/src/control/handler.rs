//! `Stop` RPC handling over accepted control connections.

use std::io::Write;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use svcboot_wire::{FrameReader, StopRequest, StopResponse, write_frame};

use super::CONTROL_TARGET;
use super::listener::ConnectionHandler;
use super::shutdown::{GracefulAck, ShutdownController, ShutdownOutcome, Trigger};

/// Counts live connection work so teardown can let final replies flush.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: Mutex<usize>,
    idle: Condvar,
}

impl ConnectionTracker {
    /// Registers one unit of work until the guard drops.
    pub fn enter(self: &Arc<Self>) -> TrackerGuard {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        TrackerGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Waits until no work is registered or `timeout` elapses.
    ///
    /// Returns whether the tracker drained.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        while *active > 0 {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            active = self
                .idle
                .wait_timeout(active, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Keeps a [`ConnectionTracker`] busy while alive.
#[derive(Debug)]
pub struct TrackerGuard {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        let mut active = self
            .tracker
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.tracker.idle.notify_all();
        }
    }
}

/// Response texts for one program.
#[derive(Debug, Clone)]
pub struct StopMessages {
    accepted: String,
    forced: String,
    completed: String,
}

impl StopMessages {
    /// Builds the texts for the program called `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            accepted: format!("Stopping {name} services..."),
            forced: format!("{name} services are forced to stop!"),
            completed: format!("{name} services are stopped gracefully"),
        }
    }

    fn accepted(&self) -> StopResponse {
        StopResponse::accepted(&self.accepted)
    }

    fn forced(&self) -> StopResponse {
        StopResponse::forced(&self.forced)
    }

    fn completed(&self) -> StopResponse {
        StopResponse::completed(&self.completed)
    }
}

/// Writing half of one connection, shared with its completion watcher.
struct Responder {
    stream: Mutex<UnixStream>,
    finished: AtomicBool,
}

impl Responder {
    fn send(&self, response: &StopResponse) -> bool {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        match write_frame(&mut *stream, response) {
            Ok(()) => true,
            Err(error) => {
                debug!(target: CONTROL_TARGET, error = %error, "failed to write stop response");
                false
            }
        }
    }

    /// Sends the last response of the stream exactly once.
    fn finish(&self, response: &StopResponse) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send(response);
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = stream.flush() {
            debug!(target: CONTROL_TARGET, error = %error, "failed to flush stop stream");
        }
        if let Err(error) = stream.shutdown(Shutdown::Both) {
            debug!(target: CONTROL_TARGET, error = %error, "failed to close stop stream");
        }
    }
}

/// Serves the `Stop` RPC on each accepted stream.
///
/// An accepted graceful request keeps the stream open for further frames
/// and for the completion response. A graceful request that escalates a
/// shutdown already in flight is answered with the forced response (-1)
/// and the stream is closed, so later frames on it go unanswered.
#[derive(Debug)]
pub struct StopHandler {
    controller: Arc<ShutdownController>,
    tracker: Arc<ConnectionTracker>,
    messages: StopMessages,
}

impl StopHandler {
    /// Builds a handler feeding `controller`.
    #[must_use]
    pub fn new(
        controller: Arc<ShutdownController>,
        tracker: Arc<ConnectionTracker>,
        messages: StopMessages,
    ) -> Self {
        Self {
            controller,
            tracker,
            messages,
        }
    }

    fn watch_completion(&self, responder: Arc<Responder>) {
        let controller = Arc::clone(&self.controller);
        let messages = self.messages.clone();
        let guard = self.tracker.enter();
        let spawned = thread::Builder::new()
            .name("stop-watcher".to_owned())
            .spawn(move || {
                let _guard = guard;
                let response = match controller.wait() {
                    ShutdownOutcome::Graceful => messages.completed(),
                    ShutdownOutcome::Forced => messages.forced(),
                };
                responder.finish(&response);
            });
        if let Err(error) = spawned {
            warn!(target: CONTROL_TARGET, error = %error, "failed to spawn stop watcher");
        }
    }
}

impl ConnectionHandler for StopHandler {
    fn handle(&self, stream: UnixStream) {
        let _guard = self.tracker.enter();
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(error) => {
                warn!(target: CONTROL_TARGET, error = %error, "failed to clone control stream");
                return;
            }
        };
        let responder = Arc::new(Responder {
            stream: Mutex::new(writer),
            finished: AtomicBool::new(false),
        });
        let mut reader = FrameReader::new(stream);
        let mut watching = false;

        loop {
            let request = match reader.next_frame::<StopRequest>() {
                Ok(Some(request)) => request,
                Ok(None) => return,
                Err(error) => {
                    warn!(target: CONTROL_TARGET, error = %error, "stop stream receive error");
                    return;
                }
            };
            debug!(target: CONTROL_TARGET, force = request.force, "stop request received");

            if request.force {
                responder.finish(&self.messages.forced());
                self.controller.request_forced(Trigger::Rpc);
                return;
            }
            match self.controller.request_graceful(Trigger::Rpc) {
                GracefulAck::Escalated => {
                    responder.finish(&self.messages.forced());
                    return;
                }
                GracefulAck::Accepted => {
                    responder.send(&self.messages.accepted());
                }
            }
            if !watching {
                watching = true;
                self.watch_completion(Arc::clone(&responder));
            }
        }
    }
}
