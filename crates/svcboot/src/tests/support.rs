//! Test doubles shared by the unit and behaviour suites.

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mockall::mock;
use tempfile::TempDir;

use svcboot_config::SocketEndpoint;

use crate::command::BoxedError;
use crate::control::{
    ControlError, ControlPlane, LifecycleReporter, ShutdownController, ShutdownOutcome, Trigger,
};
use crate::process::{ChildExit, LaunchError, SpawnRequest, Spawner};
use crate::service::Service;
use crate::signals::{SignalError, SignalSource};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

mock! {
    pub Service {}

    impl Service for Service {
        fn serve(&self) -> Result<(), BoxedError>;
        fn close(&self) -> Result<(), BoxedError>;
    }
}

/// Lifecycle event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Listening,
    Requested(Trigger),
    Escalated(Trigger),
    Forced(Trigger),
    GracefulStarted,
    CloseFailed(String),
    Stopped(ShutdownOutcome),
    ServiceFailed(String),
}

/// Reporter that records every lifecycle event.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().expect("reporter lock").clone()
    }

    pub fn escalations(&self) -> Vec<Trigger> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LifecycleEvent::Escalated(trigger) => Some(trigger),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: LifecycleEvent) {
        self.events.lock().expect("reporter lock").push(event);
    }
}

impl LifecycleReporter for RecordingReporter {
    fn listening(&self, _endpoint: &SocketEndpoint) {
        self.push(LifecycleEvent::Listening);
    }

    fn shutdown_requested(&self, trigger: Trigger) {
        self.push(LifecycleEvent::Requested(trigger));
    }

    fn shutdown_escalated(&self, trigger: Trigger) {
        self.push(LifecycleEvent::Escalated(trigger));
    }

    fn forced_requested(&self, trigger: Trigger) {
        self.push(LifecycleEvent::Forced(trigger));
    }

    fn graceful_started(&self) {
        self.push(LifecycleEvent::GracefulStarted);
    }

    fn close_failed(&self, error: &(dyn Error + 'static)) {
        self.push(LifecycleEvent::CloseFailed(error.to_string()));
    }

    fn stopped(&self, outcome: ShutdownOutcome) {
        self.push(LifecycleEvent::Stopped(outcome));
    }

    fn service_failed(&self, error: &(dyn Error + 'static)) {
        self.push(LifecycleEvent::ServiceFailed(error.to_string()));
    }
}

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    close_entered: bool,
    close_released: bool,
}

/// Service whose `serve` blocks until `close` runs.
///
/// A held service also blocks inside `close` until [`GatedService::release`]
/// is called, which keeps a graceful shutdown in flight.
#[derive(Debug, Default)]
pub struct GatedService {
    state: Mutex<GateState>,
    changed: Condvar,
    close_calls: AtomicUsize,
    hold_close: bool,
}

impl GatedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn held() -> Arc<Self> {
        Arc::new(Self {
            hold_close: true,
            ..Self::default()
        })
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn wait_for_close(&self) {
        let state = self.state.lock().expect("gate lock");
        let (state, timeout) = self
            .changed
            .wait_timeout_while(state, WAIT_LIMIT, |state| !state.close_entered)
            .expect("gate lock");
        assert!(!timeout.timed_out() && state.close_entered, "close was never called");
    }

    pub fn release(&self) {
        self.state.lock().expect("gate lock").close_released = true;
        self.changed.notify_all();
    }
}

impl Service for GatedService {
    fn serve(&self) -> Result<(), BoxedError> {
        let state = self.state.lock().expect("gate lock");
        let _state = self
            .changed
            .wait_while(state, |state| !state.closed)
            .expect("gate lock");
        Ok(())
    }

    fn close(&self) -> Result<(), BoxedError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().expect("gate lock");
        state.close_entered = true;
        self.changed.notify_all();
        if self.hold_close {
            state = self
                .changed
                .wait_while(state, |state| !state.close_released)
                .expect("gate lock");
        }
        state.closed = true;
        self.changed.notify_all();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SignalState {
    pending: Vec<i32>,
    closed: bool,
}

/// Signal source driven by the test.
#[derive(Debug, Default)]
pub struct ManualSignals {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl ManualSignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn raise(&self, signal: i32) {
        self.state.lock().expect("signal lock").pending.push(signal);
        self.changed.notify_all();
    }
}

impl SignalSource for ManualSignals {
    fn listen(&self, deliver: &mut dyn FnMut(i32)) -> Result<(), SignalError> {
        let mut state = self.state.lock().expect("signal lock");
        loop {
            let pending: Vec<i32> = state.pending.drain(..).collect();
            if !pending.is_empty() {
                drop(state);
                for signal in pending {
                    deliver(signal);
                }
                state = self.state.lock().expect("signal lock");
                continue;
            }
            if state.closed {
                return Ok(());
            }
            state = self.changed.wait(state).expect("signal lock");
        }
    }

    fn close(&self) {
        self.state.lock().expect("signal lock").closed = true;
        self.changed.notify_all();
    }
}

/// Spawner that records requests instead of starting processes.
#[derive(Debug)]
pub struct RecordingSpawner {
    requests: Mutex<Vec<SpawnRequest>>,
    exit: Option<ChildExit>,
}

impl RecordingSpawner {
    pub fn exiting_with(code: Option<i32>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            exit: Some(ChildExit::new(code)),
        }
    }

    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            exit: None,
        }
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().expect("spawner lock").clone()
    }

    fn record(&self, request: &SpawnRequest) -> Result<ChildExit, LaunchError> {
        self.requests
            .lock()
            .expect("spawner lock")
            .push(request.clone());
        self.exit.ok_or_else(|| LaunchError::Spawn {
            program: request.program.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
        })
    }
}

impl Spawner for RecordingSpawner {
    fn spawn_detached(&self, request: &SpawnRequest) -> Result<u32, LaunchError> {
        self.record(request).map(|_| 4242)
    }

    fn spawn_and_wait(&self, request: &SpawnRequest) -> Result<ChildExit, LaunchError> {
        self.record(request)
    }
}

/// A control plane serving on a background thread.
pub struct RunningServer {
    pub endpoint: SocketEndpoint,
    pub controller: Arc<ShutdownController>,
    pub reporter: Arc<RecordingReporter>,
    handle: thread::JoinHandle<Result<ShutdownOutcome, ControlError>>,
    _dir: TempDir,
}

impl RunningServer {
    pub fn start(service: Arc<dyn Service>) -> Self {
        Self::start_with(service, None)
    }

    pub fn start_with(service: Arc<dyn Service>, signals: Option<Arc<dyn SignalSource>>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let endpoint = SocketEndpoint::unix(dir.path().join("app.sock"));
        let reporter = Arc::new(RecordingReporter::default());
        let mut plane = ControlPlane::new("app", endpoint.clone(), service, reporter.clone());
        if let Some(signals) = signals {
            plane = plane.with_signals(signals);
        }
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            plane.serve_with(|controller| {
                ready_tx
                    .send(Arc::clone(controller))
                    .expect("report readiness");
            })
        });
        let controller = ready_rx
            .recv_timeout(WAIT_LIMIT)
            .expect("control plane should become ready");
        Self {
            endpoint,
            controller,
            reporter,
            handle,
            _dir: dir,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.endpoint.path().to_path_buf()
    }

    pub fn join(self) -> Result<ShutdownOutcome, ControlError> {
        let deadline = Instant::now() + WAIT_LIMIT;
        while !self.handle.is_finished() {
            assert!(Instant::now() < deadline, "control plane did not stop");
            thread::sleep(Duration::from_millis(10));
        }
        self.handle.join().expect("join control plane")
    }
}
