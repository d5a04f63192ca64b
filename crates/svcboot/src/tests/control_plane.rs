//! Control plane behaviour over a real socket.

use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;

use rstest::rstest;
use svcboot_wire::{FrameReader, ResponseKind, StopRequest, StopResponse, write_frame};

use crate::control::{ControlError, ControlPlane, ShutdownOutcome, Trigger};
use crate::service::Service;
use crate::stop::{StopClient, StopOutcome};

use super::support::{
    GatedService, LifecycleEvent, ManualSignals, MockService, RecordingReporter, RunningServer,
};

fn kinds(responses: &[StopResponse]) -> Vec<ResponseKind> {
    responses.iter().map(StopResponse::kind).collect()
}

#[test]
fn forced_stop_skips_the_shutdown_hook() {
    let service = GatedService::new();
    let server = RunningServer::start(service.clone());

    let summary = StopClient::new(server.endpoint.clone())
        .stop(true)
        .expect("forced stop");

    assert_eq!(kinds(&summary.responses), vec![ResponseKind::Forced]);
    assert_eq!(summary.responses[0].code, -1);
    assert_eq!(summary.outcome, StopOutcome::Forced);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
    assert_eq!(service.close_calls(), 0);
}

#[test]
fn graceful_stop_reports_progress_then_completion() {
    let service = GatedService::new();
    let server = RunningServer::start(service.clone());

    let summary = StopClient::new(server.endpoint.clone())
        .stop(false)
        .expect("graceful stop");

    let codes: Vec<i32> = summary.responses.iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![0, 1]);
    assert_eq!(summary.outcome, StopOutcome::Completed);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Graceful);
    assert_eq!(service.close_calls(), 1);
}

#[test]
fn second_stop_during_graceful_shutdown_forces() {
    let service = GatedService::held();
    let server = RunningServer::start(service.clone());
    let endpoint = server.endpoint.clone();

    let first = thread::spawn(move || StopClient::new(endpoint).stop(false));
    service.wait_for_close();

    let second = StopClient::new(server.endpoint.clone())
        .stop(false)
        .expect("second stop");
    assert_eq!(kinds(&second.responses), vec![ResponseKind::Forced]);

    let reporter = Arc::clone(&server.reporter);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
    let first = first.join().expect("join first client").expect("first stop");
    assert_eq!(
        kinds(&first.responses),
        vec![ResponseKind::Accepted, ResponseKind::Forced]
    );
    assert_eq!(reporter.escalations(), vec![Trigger::Rpc]);
    assert_eq!(service.close_calls(), 1);
    service.release();
}

#[test]
fn escalated_graceful_request_closes_its_stream() {
    let service = GatedService::held();
    let server = RunningServer::start(service.clone());
    let endpoint = server.endpoint.clone();

    let first = thread::spawn(move || StopClient::new(endpoint).stop(false));
    service.wait_for_close();

    let mut stream = UnixStream::connect(server.socket_path()).expect("connect");
    write_frame(&mut stream, &StopRequest::graceful()).expect("first frame");
    write_frame(&mut stream, &StopRequest::graceful()).expect("second frame");

    let mut reader = FrameReader::new(stream);
    let response: StopResponse = reader
        .next_frame()
        .expect("read response")
        .expect("a response before close");
    assert_eq!(response.kind(), ResponseKind::Forced);
    assert_eq!(response.code, -1);
    // The peer may report end of stream or a reset; either way nothing follows.
    assert!(!matches!(reader.next_frame::<StopResponse>(), Ok(Some(_))));

    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
    let first = first.join().expect("join first client").expect("first stop");
    assert_eq!(
        kinds(&first.responses),
        vec![ResponseKind::Accepted, ResponseKind::Forced]
    );
    service.release();
}

#[test]
fn termination_signal_runs_graceful_shutdown() {
    let service = GatedService::new();
    let signals = ManualSignals::new();
    let server = RunningServer::start_with(service.clone(), Some(signals.clone()));

    signals.raise(15);

    let reporter = Arc::clone(&server.reporter);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Graceful);
    assert!(
        reporter
            .events()
            .contains(&LifecycleEvent::Requested(Trigger::Signal(15)))
    );
    assert_eq!(service.close_calls(), 1);
}

#[rstest]
#[case::repeated(15, 15)]
#[case::interrupt_after_term(15, 2)]
#[case::quit_after_hangup(1, 3)]
fn second_signal_forces_shutdown(#[case] first: i32, #[case] second: i32) {
    let service = GatedService::held();
    let signals = ManualSignals::new();
    let server = RunningServer::start_with(service.clone(), Some(signals.clone()));

    signals.raise(first);
    service.wait_for_close();
    signals.raise(second);

    let reporter = Arc::clone(&server.reporter);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
    assert_eq!(reporter.escalations(), vec![Trigger::Signal(second)]);
    service.release();
}

#[test]
fn signal_after_stop_request_escalates() {
    let service = GatedService::held();
    let signals = ManualSignals::new();
    let server = RunningServer::start_with(service.clone(), Some(signals.clone()));
    let endpoint = server.endpoint.clone();

    let client = thread::spawn(move || StopClient::new(endpoint).stop(false));
    service.wait_for_close();
    signals.raise(2);

    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Forced);
    let summary = client.join().expect("join client").expect("stop");
    assert_eq!(summary.outcome, StopOutcome::Forced);
    service.release();
}

#[test]
fn second_instance_reports_already_running() {
    let service = GatedService::new();
    let server = RunningServer::start(service.clone());

    let second = ControlPlane::new(
        "app",
        server.endpoint.clone(),
        GatedService::new(),
        Arc::new(RecordingReporter::default()),
    )
    .serve();
    assert!(matches!(
        second,
        Err(ControlError::AlreadyRunning { ref name, .. }) if name == "app"
    ));

    server.controller.request_graceful(Trigger::Rpc);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Graceful);
}

#[test]
fn failing_service_body_surfaces_after_graceful_shutdown() {
    let mut service = MockService::new();
    service
        .expect_serve()
        .times(1)
        .returning(|| Err("listener exploded".into()));
    service.expect_close().times(1).returning(|| Ok(()));
    let service: Arc<dyn Service> = Arc::new(service);
    let server = RunningServer::start(service);

    let reporter = Arc::clone(&server.reporter);
    let error = server.join().expect_err("service failure");
    assert!(matches!(error, ControlError::Service { .. }));
    assert!(error.to_string().contains("listener exploded"));
    assert!(
        reporter
            .events()
            .contains(&LifecycleEvent::Requested(Trigger::ServiceExit))
    );
}

#[test]
fn service_returning_on_its_own_stops_gracefully() {
    let mut service = MockService::new();
    service.expect_serve().times(1).returning(|| Ok(()));
    service.expect_close().times(1).returning(|| Ok(()));
    let server = RunningServer::start(Arc::new(service));

    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Graceful);
}

#[test]
fn close_failure_is_reported_but_still_graceful() {
    let service = Arc::new(CloseFails(GatedService::new()));
    let server = RunningServer::start(service);
    server.controller.request_graceful(Trigger::Rpc);

    let reporter = Arc::clone(&server.reporter);
    assert_eq!(server.join().expect("server result"), ShutdownOutcome::Graceful);
    assert!(
        reporter
            .events()
            .contains(&LifecycleEvent::CloseFailed("flush failed".to_owned()))
    );
}

#[test]
fn socket_file_is_removed_after_shutdown() {
    let server = RunningServer::start(GatedService::new());
    let path = server.socket_path();
    assert!(path.exists());

    StopClient::new(server.endpoint.clone())
        .stop(true)
        .expect("forced stop");
    server.join().expect("server result");
    assert!(!path.exists());
}

struct CloseFails(Arc<GatedService>);

impl Service for CloseFails {
    fn serve(&self) -> Result<(), crate::command::BoxedError> {
        self.0.serve()
    }

    fn close(&self) -> Result<(), crate::command::BoxedError> {
        self.0.close()?;
        Err("flush failed".into())
    }
}
