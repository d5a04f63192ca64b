//! A service body that logs a heartbeat until it is closed.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use clap::{Arg, value_parser};
use tracing::info;

use svcboot::{BoxedError, Configurator, FlagSet, FlagValues, Service};

const HEARTBEAT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::heartbeat");
const INTERVAL_FLAG: &str = "interval";
const DEFAULT_INTERVAL_SECS: u64 = 5;

#[derive(Debug)]
struct State {
    interval: Duration,
    closed: bool,
    beats: u64,
}

/// Logs one line per interval while serving.
#[derive(Debug)]
pub struct Heartbeat {
    state: Mutex<State>,
    wake: Condvar,
}

impl Heartbeat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
                closed: false,
                beats: 0,
            }),
            wake: Condvar::new(),
        })
    }

    fn set_interval(&self, interval: Duration) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .interval = interval;
    }
}

impl Service for Heartbeat {
    fn serve(&self) -> Result<(), BoxedError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.closed {
            let interval = state.interval;
            let (next, timeout) = self
                .wake
                .wait_timeout(state, interval)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
            if timeout.timed_out() && !state.closed {
                state.beats += 1;
                info!(target: HEARTBEAT_TARGET, beats = state.beats, "heartbeat");
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BoxedError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        info!(target: HEARTBEAT_TARGET, beats = state.beats, "heartbeat stopped");
        drop(state);
        self.wake.notify_all();
        Ok(())
    }
}

/// Binds `--interval` (seconds) to a [`Heartbeat`].
#[derive(Debug)]
pub struct IntervalSettings {
    service: Arc<Heartbeat>,
}

impl IntervalSettings {
    pub fn new(service: Arc<Heartbeat>) -> Self {
        Self { service }
    }
}

impl Configurator for IntervalSettings {
    fn register(&self, flags: FlagSet) -> FlagSet {
        flags.arg(
            Arg::new(INTERVAL_FLAG)
                .long(INTERVAL_FLAG)
                .value_name("seconds")
                .value_parser(value_parser!(u64))
                .default_value(DEFAULT_INTERVAL_SECS.to_string())
                .help("seconds between heartbeats"),
        )
    }

    fn validate(&mut self, values: &FlagValues) -> Result<(), BoxedError> {
        let seconds = values
            .get_one::<u64>(INTERVAL_FLAG)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        if seconds == 0 {
            return Err("interval must be at least one second".into());
        }
        self.service.set_interval(Duration::from_secs(seconds));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use rstest::rstest;
    use svcboot::resolve::resolve;

    fn resolved(args: &[&str]) -> FlagValues {
        let settings = IntervalSettings::new(Heartbeat::new());
        let flags = settings.register(FlagSet::new("start"));
        let args: Vec<String> = args.iter().map(|arg| (*arg).to_owned()).collect();
        resolve(&flags, &args, &[]).expect("resolve interval")
    }

    #[rstest]
    #[case(&[], Duration::from_secs(DEFAULT_INTERVAL_SECS))]
    #[case(&["--interval", "2"], Duration::from_secs(2))]
    fn validate_applies_interval(#[case] args: &[&str], #[case] expected: Duration) {
        let service = Heartbeat::new();
        let mut settings = IntervalSettings::new(Arc::clone(&service));

        settings.validate(&resolved(args)).expect("valid interval");

        let state = service.state.lock().expect("state lock");
        assert_eq!(state.interval, expected);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut settings = IntervalSettings::new(Heartbeat::new());
        let error = settings
            .validate(&resolved(&["--interval", "0"]))
            .expect_err("zero interval");
        assert!(error.to_string().contains("at least one second"));
    }

    #[test]
    fn close_ends_serve() {
        let service = Heartbeat::new();
        let serving = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.serve())
        };
        service.close().expect("close");
        serving
            .join()
            .expect("join serve")
            .expect("serve returns cleanly");
    }
}
