//! Structured telemetry initialisation.
//!
//! Events go through a process-wide [`LogSink`] that writes to standard error
//! until it is redirected, which is how the daemon's internal run command moves
//! its logging into the log file.

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::{Lazy, OnceCell};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use svcboot_config::LogFormat;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();
static LOG_SINK: Lazy<LogSink> = Lazy::new(LogSink::stderr);

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Filter and format used when installing the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    filter: String,
    format: LogFormat,
}

impl TelemetrySettings {
    /// Builds settings from a filter directive and an output format.
    #[must_use]
    pub fn new(filter: impl Into<String>, format: LogFormat) -> Self {
        Self {
            filter: filter.into(),
            format,
        }
    }

    /// `EnvFilter` directive.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Output format.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self::new(svcboot_config::default_log_filter(), svcboot_config::default_log_format())
    }
}

enum SinkTarget {
    Stderr,
    File(File),
}

/// Shared destination of every telemetry event.
#[derive(Clone)]
pub struct LogSink {
    target: Arc<Mutex<SinkTarget>>,
}

impl LogSink {
    fn stderr() -> Self {
        Self {
            target: Arc::new(Mutex::new(SinkTarget::Stderr)),
        }
    }

    /// The process-wide sink.
    #[must_use]
    pub fn global() -> &'static Self {
        &LOG_SINK
    }

    /// Sends all further events to `file`.
    pub fn redirect(&self, file: File) {
        *self.lock() = SinkTarget::File(file);
    }

    /// Sends all further events back to standard error.
    pub fn restore(&self) {
        *self.lock() = SinkTarget::Stderr;
    }

    /// Whether events currently reach an interactive terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(*self.lock(), SinkTarget::Stderr) && io::stderr().is_terminal()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkTarget> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match *self.lock() {
            SinkTarget::Stderr => "stderr",
            SinkTarget::File(_) => "file",
        };
        f.debug_struct("LogSink").field("target", &target).finish()
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.lock() {
            SinkTarget::Stderr => io::stderr().write(buf),
            SinkTarget::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.lock() {
            SinkTarget::Stderr => io::stderr().flush(),
            SinkTarget::File(file) => file.flush(),
        }
    }
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first invocation installs the global
/// subscriber and later ones return a fresh [`TelemetryHandle`].
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or another subscriber
/// is already installed.
pub fn initialise(settings: &TelemetrySettings) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(settings))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(settings: &TelemetrySettings) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(settings.filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let sink = LogSink::global();
    let ansi = sink.is_terminal();

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(move || sink.clone())
            .with_ansi(ansi)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match settings.format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
