//! Termination signal delivery.
//!
//! Both the control plane and the stop client treat OS signals as one more
//! producer of shutdown triggers. A [`SignalSource`] blocks on its own thread,
//! hands every delivered signal to a callback and returns once closed.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use nix::sys::signal::Signal;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;

/// Signals treated as termination requests.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGHUP, SIGINT, SIGTERM, SIGQUIT];

/// Errors reported by signal listeners.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Blocking producer of termination signals.
pub trait SignalSource: Send + Sync {
    /// Delivers each signal to `deliver` until [`SignalSource::close`] is
    /// called.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when handlers cannot be installed.
    fn listen(&self, deliver: &mut dyn FnMut(i32)) -> Result<(), SignalError>;

    /// Makes a pending or future `listen` return.
    fn close(&self);
}

/// Signal source backed by `signal-hook`.
#[derive(Default)]
pub struct SystemSignals {
    handle: Mutex<Option<Handle>>,
    closed: AtomicBool,
}

impl SystemSignals {
    /// Builds a source for [`TERMINATION_SIGNALS`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for SystemSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSignals")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SignalSource for SystemSignals {
    fn listen(&self, deliver: &mut dyn FnMut(i32)) -> Result<(), SignalError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| SignalError::Install { source })?;
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(signals.handle());
        if self.closed.load(Ordering::SeqCst) {
            signals.handle().close();
        }
        for signal in signals.forever() {
            deliver(signal);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            handle.close();
        }
    }
}

/// Conventional name of a signal number, such as `SIGTERM`.
#[must_use]
pub fn signal_name(signal: i32) -> String {
    Signal::try_from(signal).map_or_else(|_| format!("signal {signal}"), |sig| sig.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SIGTERM, "SIGTERM")]
    #[case(SIGHUP, "SIGHUP")]
    #[case(4096, "signal 4096")]
    fn names_signals(#[case] signal: i32, #[case] expected: &str) {
        assert_eq!(signal_name(signal), expected);
    }

    #[test]
    fn closing_before_listening_returns_immediately() {
        let source = SystemSignals::new();
        source.close();
        let mut seen = Vec::new();
        source
            .listen(&mut |signal| seen.push(signal))
            .expect("install handlers");
        assert!(seen.is_empty());
    }
}
