//! Structured reporting for control plane lifecycle events.

use std::error::Error;
use std::sync::Arc;

use svcboot_config::SocketEndpoint;

use super::shutdown::{ShutdownOutcome, Trigger};

/// Observer trait used to surface control plane events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// The control socket accepts connections.
    fn listening(&self, endpoint: &SocketEndpoint);

    /// The first shutdown trigger arrived.
    fn shutdown_requested(&self, trigger: Trigger);

    /// A trigger arrived while already exiting and was escalated.
    fn shutdown_escalated(&self, trigger: Trigger);

    /// A forced shutdown was requested directly.
    fn forced_requested(&self, trigger: Trigger);

    /// The service's shutdown hook is about to run.
    fn graceful_started(&self);

    /// The service's shutdown hook failed.
    fn close_failed(&self, error: &(dyn Error + 'static));

    /// Shutdown finished.
    fn stopped(&self, outcome: ShutdownOutcome);

    /// The service body returned an error.
    fn service_failed(&self, error: &(dyn Error + 'static));
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn listening(&self, endpoint: &SocketEndpoint) {
        (**self).listening(endpoint);
    }

    fn shutdown_requested(&self, trigger: Trigger) {
        (**self).shutdown_requested(trigger);
    }

    fn shutdown_escalated(&self, trigger: Trigger) {
        (**self).shutdown_escalated(trigger);
    }

    fn forced_requested(&self, trigger: Trigger) {
        (**self).forced_requested(trigger);
    }

    fn graceful_started(&self) {
        (**self).graceful_started();
    }

    fn close_failed(&self, error: &(dyn Error + 'static)) {
        (**self).close_failed(error);
    }

    fn stopped(&self, outcome: ShutdownOutcome) {
        (**self).stopped(outcome);
    }

    fn service_failed(&self, error: &(dyn Error + 'static)) {
        (**self).service_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Clone)]
pub struct StructuredLifecycleReporter {
    name: String,
}

impl StructuredLifecycleReporter {
    /// Builds a reporter for the program called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

impl LifecycleReporter for StructuredLifecycleReporter {
    fn listening(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "listening",
            endpoint = %endpoint,
            "{} control plane listening",
            self.name
        );
    }

    fn shutdown_requested(&self, trigger: Trigger) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "shutdown_requested",
            trigger = %trigger,
            "Stopping {} services...",
            self.name
        );
    }

    fn shutdown_escalated(&self, trigger: Trigger) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "shutdown_escalated",
            trigger = %trigger,
            "shutdown already in progress; forcing {} to stop",
            self.name
        );
    }

    fn forced_requested(&self, trigger: Trigger) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "forced_requested",
            trigger = %trigger,
            "forced stop requested for {}",
            self.name
        );
    }

    fn graceful_started(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "graceful_started",
            "closing {} services",
            self.name
        );
    }

    fn close_failed(&self, error: &(dyn Error + 'static)) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "close_failed",
            error = %error,
            "{} services failed to close",
            self.name
        );
    }

    fn stopped(&self, outcome: ShutdownOutcome) {
        match outcome {
            ShutdownOutcome::Graceful => tracing::info!(
                target: LIFECYCLE_TARGET,
                event = "stopped",
                outcome = "graceful",
                "{} services are stopped gracefully",
                self.name
            ),
            ShutdownOutcome::Forced => tracing::error!(
                target: LIFECYCLE_TARGET,
                event = "stopped",
                outcome = "forced",
                "{} services are forced to stop!",
                self.name
            ),
        }
    }

    fn service_failed(&self, error: &(dyn Error + 'static)) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "service_failed",
            error = %error,
            "{} service returned an error",
            self.name
        );
    }
}
