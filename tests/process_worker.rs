// tests/process_worker.rs
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{JobSpecBuilder, RecordingSink, SupervisorConfigBuilder, init_tracing, with_timeout_of};
use jobvisor::job::{JobOutcome, JobRequest};
use jobvisor::progress::StatusLineParser;
use jobvisor::publish::{ProgressPublisher, ThrottlePolicy};
use jobvisor::supervisor::{AdminList, ProcessSupervisor, SupervisorConfig, SupervisorError};
use jobvisor::types::Requester;
use jobvisor::worker::CommandLauncher;

const LIMIT: Duration = Duration::from_secs(15);

fn sh_config(script: &str) -> SupervisorConfigBuilder {
    SupervisorConfigBuilder::new().worker("sh", &["-c", script, "worker"])
}

fn supervisor(config: SupervisorConfig) -> (ProcessSupervisor, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let publisher = Arc::new(ProgressPublisher::new(
        sink.clone(),
        ThrottlePolicy::default(),
        3,
    ));
    let supervisor = ProcessSupervisor::new(
        config,
        StatusLineParser::default(),
        Arc::new(CommandLauncher::new()),
        publisher,
        Arc::new(AdminList::default()),
    );
    (supervisor, sink)
}

fn request(duration_secs: u64) -> JobRequest {
    JobRequest::new(
        JobSpecBuilder::new().duration_secs(duration_secs).build(),
        Requester::new("alice"),
    )
}

#[tokio::test]
async fn real_worker_reports_progress_and_completes() {
    init_tracing();
    // $4 is the thread count (4 by default in JobSpecBuilder).
    let (sup, sink) = supervisor(
        sh_config(r#"echo "starting $1"; echo "Status: [200: 1]"; echo "Status: [200: $4, 404: 1]"; exit 0"#)
            .build(),
    );
    let record = sup.spawn(request(10)).unwrap();
    assert!(record.state().pid.is_some());

    let outcome = with_timeout_of(LIMIT, record.wait_terminal()).await;
    assert_eq!(outcome, Some(JobOutcome::Completed));

    let finals = sink.finals_for(record.id());
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].total, 5);
    assert_eq!(finals[0].success, 4);
    assert_eq!(finals[0].exit_code, Some(0));
    assert_eq!(sup.total_count(), 0);
}

#[tokio::test]
async fn nonzero_exit_with_mostly_successful_traffic_is_partial() {
    let (sup, sink) = supervisor(sh_config(r#"echo "Status: [200: 9, 500: 1]"; exit 3"#).build());
    let record = sup.spawn(request(10)).unwrap();

    let outcome = with_timeout_of(LIMIT, record.wait_terminal()).await;
    assert_eq!(outcome, Some(JobOutcome::Partial));
    assert_eq!(sink.finals_for(record.id())[0].exit_code, Some(3));
}

#[tokio::test]
async fn stop_sends_interrupt_to_worker() {
    let (sup, _sink) = supervisor(
        sh_config("trap 'exit 130' INT; echo ready; while :; do sleep 0.1; done").build(),
    );
    let record = sup.spawn(request(60)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    sup.stop(record.id(), &Requester::new("alice")).unwrap();
    let outcome = with_timeout_of(LIMIT, record.wait_terminal()).await;
    assert_eq!(outcome, Some(JobOutcome::Stopped));
    assert_eq!(record.state().exit_code, Some(130));
}

#[tokio::test]
async fn worker_ignoring_interrupt_is_killed() {
    let (sup, _sink) = supervisor(
        sh_config("trap '' INT; while :; do sleep 0.1; done")
            .kill_grace(Duration::from_millis(300))
            .build(),
    );
    let record = sup.spawn(request(60)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    sup.stop(record.id(), &Requester::new("alice")).unwrap();
    let outcome = with_timeout_of(LIMIT, record.wait_terminal()).await;
    assert_eq!(outcome, Some(JobOutcome::Stopped));
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(record.state().exit_code, None);
}

#[tokio::test]
async fn deadline_interrupts_overrunning_worker() {
    let (sup, sink) = supervisor(
        sh_config("exec sleep 30")
            .grace(Duration::from_millis(200))
            .build(),
    );
    let start = Instant::now();
    let record = sup.spawn(request(1)).unwrap();

    let outcome = with_timeout_of(LIMIT, record.wait_terminal()).await;
    assert_eq!(outcome, Some(JobOutcome::TimedOut));
    assert!(start.elapsed() >= Duration::from_millis(1200));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(sink.finals_for(record.id()).len(), 1);
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let (sup, sink) = supervisor(
        SupervisorConfigBuilder::new()
            .worker("/nonexistent/jobvisor-worker", &[])
            .build(),
    );
    let err = sup.spawn(request(5)).unwrap_err();
    assert!(matches!(err, SupervisorError::Spawn { .. }));
    assert_eq!(sup.total_count(), 0);
    assert!(sink.is_empty());
}
