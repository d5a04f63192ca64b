//! Stop client against live and missing daemons.

use std::thread;

use svcboot_config::SocketEndpoint;
use svcboot_wire::ResponseKind;

use crate::control::ShutdownOutcome;
use crate::stop::{StopClient, StopError, StopOutcome};

use super::support::{GatedService, ManualSignals, RunningServer};

#[test]
fn missing_socket_means_not_running() {
    let dir = tempfile::tempdir().expect("temp dir");
    let endpoint = SocketEndpoint::unix(dir.path().join("absent.sock"));

    let error = StopClient::new(endpoint)
        .stop(false)
        .expect_err("nothing listens");

    assert!(matches!(error, StopError::NotRunning { .. }));
}

#[test]
fn signal_while_waiting_forces_the_daemon() {
    let service = GatedService::held();
    let server = RunningServer::start(service.clone());
    let signals = ManualSignals::new();
    let client = StopClient::new(server.endpoint.clone()).with_signals(signals.clone());

    let waiting = thread::spawn(move || client.stop(false));
    service.wait_for_close();
    signals.raise(2);

    let summary = waiting
        .join()
        .expect("join client")
        .expect("interrupted stop");
    assert_eq!(summary.outcome, StopOutcome::Interrupted(2));
    assert!(
        summary
            .responses
            .iter()
            .all(|response| response.kind() == ResponseKind::Accepted)
    );
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
    service.release();
}

#[test]
fn completed_stop_wins_over_an_idle_signal_source() {
    let server = RunningServer::start(GatedService::new());

    let summary = StopClient::new(server.endpoint.clone())
        .with_signals(ManualSignals::new())
        .stop(false)
        .expect("graceful stop");

    let kinds: Vec<_> = summary.responses.iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![ResponseKind::Accepted, ResponseKind::Completed]);
    assert_eq!(summary.outcome, StopOutcome::Completed);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Graceful);
}

#[test]
fn forced_stop_ignores_the_signal_source() {
    let server = RunningServer::start(GatedService::new());
    let signals = ManualSignals::new();
    signals.raise(15);

    let summary = StopClient::new(server.endpoint.clone())
        .with_signals(signals)
        .stop(true)
        .expect("forced stop");

    assert_eq!(summary.outcome, StopOutcome::Forced);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
}
