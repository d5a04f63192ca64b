//! Shutdown state machine shared by the stop RPC and signal delivery.
//!
//! The first trigger to observe `exiting == false` starts the one graceful
//! sequence; every later trigger is escalated to a forced shutdown under the
//! same lock. Each trigger queue holds one pending item, so repeated triggers
//! coalesce.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::signals::signal_name;

use super::reporter::LifecycleReporter;

/// What caused a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A `Stop` request on the control socket.
    Rpc,
    /// An OS signal.
    Signal(i32),
    /// The service body returned on its own.
    ServiceExit,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc => f.write_str("stop request"),
            Self::Signal(signal) => f.write_str(&signal_name(*signal)),
            Self::ServiceExit => f.write_str("service exit"),
        }
    }
}

/// How shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The service's shutdown hook ran to completion.
    Graceful,
    /// The shutdown hook was bypassed.
    Forced,
}

/// How a graceful request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulAck {
    /// The request started the graceful sequence.
    Accepted,
    /// Shutdown was already under way; the request was escalated.
    Escalated,
}

#[derive(Debug, Default)]
struct Flags {
    exiting: bool,
    forced: bool,
}

/// Receiving ends of the trigger queues, consumed by the waiter threads.
#[derive(Debug)]
pub struct TriggerQueues {
    /// Fires once when the graceful sequence should run.
    pub graceful: Receiver<()>,
    /// Fires once when shutdown must be forced.
    pub forced: Receiver<()>,
}

/// Lock-guarded shutdown flags, trigger queues and completion latch.
pub struct ShutdownController {
    flags: Mutex<Flags>,
    graceful_tx: Mutex<Option<SyncSender<()>>>,
    forced_tx: Mutex<Option<SyncSender<()>>>,
    outcome: Mutex<Option<ShutdownOutcome>>,
    completed: Condvar,
    reporter: Arc<dyn LifecycleReporter>,
}

impl ShutdownController {
    /// Builds a controller and the queues its waiters consume.
    #[must_use]
    pub fn new(reporter: Arc<dyn LifecycleReporter>) -> (Arc<Self>, TriggerQueues) {
        let (graceful_tx, graceful) = mpsc::sync_channel(1);
        let (forced_tx, forced) = mpsc::sync_channel(1);
        let controller = Arc::new(Self {
            flags: Mutex::new(Flags::default()),
            graceful_tx: Mutex::new(Some(graceful_tx)),
            forced_tx: Mutex::new(Some(forced_tx)),
            outcome: Mutex::new(None),
            completed: Condvar::new(),
            reporter,
        });
        (controller, TriggerQueues { graceful, forced })
    }

    /// Requests a graceful shutdown, escalating when already exiting.
    pub fn request_graceful(&self, trigger: Trigger) -> GracefulAck {
        let mut flags = lock(&self.flags);
        if flags.exiting {
            flags.forced = true;
            drop(flags);
            self.reporter.shutdown_escalated(trigger);
            enqueue(&self.forced_tx);
            GracefulAck::Escalated
        } else {
            flags.exiting = true;
            drop(flags);
            self.reporter.shutdown_requested(trigger);
            enqueue(&self.graceful_tx);
            GracefulAck::Accepted
        }
    }

    /// Requests a forced shutdown.
    pub fn request_forced(&self, trigger: Trigger) {
        {
            let mut flags = lock(&self.flags);
            flags.exiting = true;
            flags.forced = true;
        }
        self.reporter.forced_requested(trigger);
        enqueue(&self.forced_tx);
    }

    /// Records how shutdown ended; only the first outcome sticks.
    pub fn complete(&self, outcome: ShutdownOutcome) -> ShutdownOutcome {
        let mut slot = lock(&self.outcome);
        let recorded = *slot.get_or_insert(outcome);
        drop(slot);
        self.completed.notify_all();
        recorded
    }

    /// Blocks until shutdown completes.
    pub fn wait(&self) -> ShutdownOutcome {
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = *slot {
                return outcome;
            }
            slot = self
                .completed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until shutdown completes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ShutdownOutcome> {
        let deadline = Instant::now() + timeout;
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = *slot {
                return Some(outcome);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            slot = self
                .completed
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Recorded outcome, if shutdown has completed.
    #[must_use]
    pub fn outcome(&self) -> Option<ShutdownOutcome> {
        *lock(&self.outcome)
    }

    /// Whether a shutdown sequence has started.
    #[must_use]
    pub fn is_exiting(&self) -> bool {
        lock(&self.flags).exiting
    }

    /// Whether shutdown has been forced.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        lock(&self.flags).forced
    }

    /// Drops the queue senders so idle waiters return.
    pub fn close_queues(&self) {
        lock(&self.graceful_tx).take();
        lock(&self.forced_tx).take();
    }

    pub(crate) fn reporter(&self) -> &dyn LifecycleReporter {
        self.reporter.as_ref()
    }
}

impl fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = lock(&self.flags);
        f.debug_struct("ShutdownController")
            .field("exiting", &flags.exiting)
            .field("forced", &flags.forced)
            .field("outcome", &*lock(&self.outcome))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn enqueue(sender: &Mutex<Option<SyncSender<()>>>) {
    if let Some(sender) = lock(sender).as_ref() {
        match sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(()) | TrySendError::Disconnected(())) => {}
        }
    }
}
