//! Stop client driving one `Stop` stream.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::{debug, error, info, warn};

use svcboot_config::SocketEndpoint;
use svcboot_wire::{FrameError, FrameReader, ResponseKind, StopRequest, StopResponse, write_frame};

use crate::signals::{SignalSource, signal_name};

use super::{STOP_TARGET, StopError, transport};

/// How a stop attempt ended from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The daemon closed the stream after a graceful stop.
    Completed,
    /// The daemon acknowledged a forced stop.
    Forced,
    /// A signal interrupted the wait and a forced stop was sent.
    Interrupted(i32),
}

/// Responses received during one stop attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSummary {
    /// Responses in arrival order.
    pub responses: Vec<StopResponse>,
    /// How the attempt ended.
    pub outcome: StopOutcome,
}

impl StopSummary {
    fn from_responses(responses: Vec<StopResponse>) -> Self {
        let forced = responses
            .iter()
            .any(|response| response.kind() == ResponseKind::Forced);
        Self {
            responses,
            outcome: if forced {
                StopOutcome::Forced
            } else {
                StopOutcome::Completed
            },
        }
    }
}

enum Event {
    Response(StopResponse),
    Closed,
    Failed(FrameError),
    Signal(i32),
}

/// Asks the daemon behind a control socket to stop.
pub struct StopClient {
    endpoint: SocketEndpoint,
    signals: Option<Arc<dyn SignalSource>>,
}

impl StopClient {
    /// Builds a client for `endpoint` without signal escalation.
    #[must_use]
    pub const fn new(endpoint: SocketEndpoint) -> Self {
        Self {
            endpoint,
            signals: None,
        }
    }

    /// Escalates a pending graceful stop when `source` delivers a signal.
    #[must_use]
    pub fn with_signals(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.signals = Some(source);
        self
    }

    /// Sends one stop request and follows the stream until it closes.
    ///
    /// A forced request, or a client without a signal source, reads
    /// responses on the calling thread. Otherwise responses and signals race
    /// and the first signal ends the wait with [`StopOutcome::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns [`StopError::NotRunning`] when no daemon answers, and other
    /// variants for transport failures.
    pub fn stop(&self, force: bool) -> Result<StopSummary, StopError> {
        let mut stream = transport::connect(&self.endpoint)?;
        let request = if force {
            StopRequest::forced()
        } else {
            StopRequest::graceful()
        };
        write_frame(&mut stream, &request)?;
        debug!(
            target: STOP_TARGET,
            endpoint = %self.endpoint,
            force,
            "stop request sent"
        );

        match (&self.signals, force) {
            (Some(source), false) => Self::race(stream, source),
            _ => Self::follow(stream),
        }
    }

    fn follow(stream: UnixStream) -> Result<StopSummary, StopError> {
        let mut reader = FrameReader::new(stream);
        let mut responses = Vec::new();
        while let Some(response) = reader.next_frame::<StopResponse>()? {
            report(&response);
            responses.push(response);
        }
        Ok(StopSummary::from_responses(responses))
    }

    fn race(mut stream: UnixStream, source: &Arc<dyn SignalSource>) -> Result<StopSummary, StopError> {
        let (events, inbox) = mpsc::channel();
        let reader = spawn_reader(stream.try_clone()?, events.clone())?;
        let listener = spawn_signal_listener(Arc::clone(source), events)?;

        let mut responses = Vec::new();
        let result = loop {
            match inbox.recv() {
                Ok(Event::Response(response)) => {
                    report(&response);
                    responses.push(response);
                }
                Ok(Event::Closed) | Err(_) => break Ok(StopSummary::from_responses(responses)),
                Ok(Event::Failed(error)) => break Err(StopError::Frame(error)),
                Ok(Event::Signal(signal)) => {
                    error!(
                        target: STOP_TARGET,
                        signal = %signal_name(signal),
                        "interrupted; forcing the daemon to stop"
                    );
                    if let Err(error) = write_frame(&mut stream, &StopRequest::forced()) {
                        warn!(target: STOP_TARGET, error = %error, "failed to send forced stop");
                    }
                    break Ok(StopSummary {
                        responses,
                        outcome: StopOutcome::Interrupted(signal),
                    });
                }
            }
        };

        if let Err(error) = stream.shutdown(Shutdown::Both) {
            debug!(target: STOP_TARGET, error = %error, "failed to close stop stream");
        }
        source.close();
        for handle in [reader, listener] {
            if handle.join().is_err() {
                warn!(target: STOP_TARGET, "stop client thread panicked");
            }
        }
        result
    }
}

impl std::fmt::Debug for StopClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopClient")
            .field("endpoint", &self.endpoint)
            .field("signals", &self.signals.is_some())
            .finish()
    }
}

fn spawn_reader(
    stream: UnixStream,
    events: Sender<Event>,
) -> Result<thread::JoinHandle<()>, StopError> {
    let handle = thread::Builder::new()
        .name("stop-reader".to_owned())
        .spawn(move || {
            let mut reader = FrameReader::new(stream);
            loop {
                let event = match reader.next_frame::<StopResponse>() {
                    Ok(Some(response)) => Event::Response(response),
                    Ok(None) => Event::Closed,
                    Err(error) => Event::Failed(error),
                };
                let last = !matches!(event, Event::Response(_));
                if events.send(event).is_err() || last {
                    return;
                }
            }
        })?;
    Ok(handle)
}

fn spawn_signal_listener(
    source: Arc<dyn SignalSource>,
    events: Sender<Event>,
) -> Result<thread::JoinHandle<()>, StopError> {
    let handle = thread::Builder::new()
        .name("stop-signals".to_owned())
        .spawn(move || {
            let outcome = source.listen(&mut |signal| {
                if events.send(Event::Signal(signal)).is_err() {
                    debug!(target: STOP_TARGET, signal, "signal arrived after the stop wait ended");
                }
            });
            if let Err(error) = outcome {
                warn!(target: STOP_TARGET, error = %error, "signal listener failed");
            }
        })?;
    Ok(handle)
}

fn report(response: &StopResponse) {
    match response.kind() {
        ResponseKind::Forced => error!(
            target: STOP_TARGET,
            code = response.code,
            "{}",
            response.message
        ),
        ResponseKind::Accepted => warn!(
            target: STOP_TARGET,
            code = response.code,
            "{}",
            response.message
        ),
        ResponseKind::Completed => info!(
            target: STOP_TARGET,
            code = response.code,
            "{}",
            response.message
        ),
    }
}
