//! Control plane server supervising one service body.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

use svcboot_config::SocketEndpoint;

use crate::command::BoxedError;
use crate::service::Service;
use crate::signals::SignalSource;

use super::handler::{ConnectionTracker, StopHandler, StopMessages};
use super::listener::SocketListener;
use super::reporter::LifecycleReporter;
use super::shutdown::{ShutdownController, ShutdownOutcome, Trigger};
use super::{CONTROL_TARGET, ControlError, DRAIN_TIMEOUT, ListenerError};

/// Binds the control socket and supervises a [`Service`] until shutdown.
pub struct ControlPlane {
    name: String,
    endpoint: SocketEndpoint,
    service: Arc<dyn Service>,
    reporter: Arc<dyn LifecycleReporter>,
    signals: Option<Arc<dyn SignalSource>>,
}

impl ControlPlane {
    /// Builds a server for the program called `name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        endpoint: SocketEndpoint,
        service: Arc<dyn Service>,
        reporter: Arc<dyn LifecycleReporter>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            service,
            reporter,
            signals: None,
        }
    }

    /// Feeds termination signals from `source` into the shutdown machine.
    #[must_use]
    pub fn with_signals(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.signals = Some(source);
        self
    }

    /// Socket the server binds.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Binds the socket, runs the service and blocks until shutdown ends.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::AlreadyRunning`] when another instance owns
    /// the socket, [`ControlError::Service`] when the service body failed,
    /// and other variants for setup failures.
    pub fn serve(self) -> Result<ShutdownOutcome, ControlError> {
        self.serve_with(|_| {})
    }

    /// Like [`ControlPlane::serve`], calling `on_ready` once the socket
    /// accepts connections.
    ///
    /// # Errors
    ///
    /// See [`ControlPlane::serve`].
    pub fn serve_with(
        self,
        on_ready: impl FnOnce(&Arc<ShutdownController>),
    ) -> Result<ShutdownOutcome, ControlError> {
        self.endpoint.prepare_filesystem()?;
        let bound = SocketListener::bind(&self.endpoint).map_err(|error| match error {
            ListenerError::UnixInUse { path } => ControlError::AlreadyRunning {
                name: self.name.clone(),
                path,
            },
            other => ControlError::Listener(other),
        })?;

        let (controller, queues) = ShutdownController::new(Arc::clone(&self.reporter));
        let tracker = Arc::new(ConnectionTracker::default());
        let handler = Arc::new(StopHandler::new(
            Arc::clone(&controller),
            Arc::clone(&tracker),
            StopMessages::new(&self.name),
        ));
        let listener = bound.start(handler).map_err(ControlError::Listener)?;
        self.reporter.listening(&self.endpoint);

        spawn("graceful-waiter", {
            let controller = Arc::clone(&controller);
            let service = Arc::clone(&self.service);
            move || graceful_waiter(&queues.graceful, &controller, service.as_ref())
        })?;
        spawn("forced-waiter", {
            let controller = Arc::clone(&controller);
            move || forced_waiter(&queues.forced, &controller)
        })?;
        if let Some(source) = &self.signals {
            let source = Arc::clone(source);
            let controller = Arc::clone(&controller);
            spawn("signal-listener", move || {
                let outcome = source.listen(&mut |signal| {
                    controller.request_graceful(Trigger::Signal(signal));
                });
                if let Err(error) = outcome {
                    warn!(target: CONTROL_TARGET, error = %error, "signal listener failed");
                }
            })?;
        }

        let failure: Arc<Mutex<Option<BoxedError>>> = Arc::new(Mutex::new(None));
        spawn("service", {
            let controller = Arc::clone(&controller);
            let service = Arc::clone(&self.service);
            let failure = Arc::clone(&failure);
            move || {
                let result = service.serve();
                if controller.is_exiting() {
                    if let Err(error) = result {
                        controller.reporter().service_failed(&*error);
                    }
                    return;
                }
                match result {
                    Ok(()) => debug!(target: CONTROL_TARGET, "service returned before shutdown"),
                    Err(error) => {
                        controller.reporter().service_failed(&*error);
                        *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
                    }
                }
                controller.request_graceful(Trigger::ServiceExit);
            }
        })?;

        on_ready(&controller);
        let outcome = controller.wait();

        listener.shutdown();
        if let Err(error) = listener.join() {
            warn!(target: CONTROL_TARGET, error = %error, "listener shutdown failed");
        }
        if let Some(source) = &self.signals {
            source.close();
        }
        controller.close_queues();
        if !tracker.drain(DRAIN_TIMEOUT) {
            warn!(target: CONTROL_TARGET, "control connections still open after drain timeout");
        }
        self.reporter.stopped(outcome);

        let failure = failure.lock().unwrap_or_else(PoisonError::into_inner).take();
        match failure {
            Some(source) => Err(ControlError::Service { source }),
            None => Ok(outcome),
        }
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("signals", &self.signals.is_some())
            .finish_non_exhaustive()
    }
}

fn spawn(role: &'static str, body: impl FnOnce() + Send + 'static) -> Result<(), ControlError> {
    thread::Builder::new()
        .name(role.to_owned())
        .spawn(body)
        .map(drop)
        .map_err(|source| ControlError::Thread { role, source })
}

fn graceful_waiter(queue: &Receiver<()>, controller: &ShutdownController, service: &dyn Service) {
    if queue.recv().is_err() {
        return;
    }
    controller.reporter().graceful_started();
    if let Err(error) = service.close() {
        controller.reporter().close_failed(&*error);
    }
    controller.complete(ShutdownOutcome::Graceful);
}

fn forced_waiter(queue: &Receiver<()>, controller: &ShutdownController) {
    if queue.recv().is_ok() {
        controller.complete(ShutdownOutcome::Forced);
    }
}
