// tests/service.rs

mod common;

use std::time::Duration;

use common::{HarnessBuilder, JobSpecBuilder, with_timeout_of};
use jobvisor::job::JobOutcome;
use jobvisor::service::ServiceError;
use jobvisor::supervisor::SupervisorError;
use jobvisor::types::{JobId, Requester};
use tokio::time::sleep;

const LIMIT: Duration = Duration::from_secs(120);

fn alice() -> Requester {
    Requester::new("alice")
}

fn bob() -> Requester {
    Requester::new("bob")
}

#[tokio::test(start_paused = true)]
async fn templates_can_be_saved_listed_launched_and_deleted() {
    let h = HarnessBuilder::new().build();
    let service = h.service(Duration::from_secs(2));
    let spec = JobSpecBuilder::new().target("nightly.test").duration_secs(30).build();

    let saved = service.save_template("nightly", spec.clone(), &alice()).unwrap();
    assert_eq!(saved.owner, alice());
    assert_eq!(service.list_templates().len(), 1);

    let id = service.launch_template("nightly", &bob(), None).unwrap();
    let record = h.supervisor.get(id).unwrap();
    assert_eq!(record.spec(), &spec);
    assert_eq!(record.owner(), &bob());

    let err = service.delete_template("nightly", &bob()).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Supervisor(SupervisorError::Forbidden(_))
    ));
    service.delete_template("nightly", &alice()).unwrap();
    assert!(service.list_templates().is_empty());

    let err = service.launch_template("nightly", &alice(), None).unwrap_err();
    assert!(matches!(err, ServiceError::TemplateNotFound(name) if name == "nightly"));
}

#[tokio::test(start_paused = true)]
async fn template_overwrite_is_limited_to_owner_and_admins() {
    let h = HarnessBuilder::new().admin("root").build();
    let service = h.service(Duration::from_secs(2));
    let original = JobSpecBuilder::new().target("nightly.test").build();
    service.save_template("nightly", original.clone(), &alice()).unwrap();

    let err = service
        .save_template("nightly", JobSpecBuilder::new().target("evil.test").build(), &bob())
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Supervisor(SupervisorError::Forbidden(_))
    ));
    let templates = service.list_templates();
    let kept = &templates[0];
    assert_eq!(kept.owner, alice());
    assert_eq!(kept.spec, original);
    service.delete_template("nightly", &bob()).unwrap_err();

    let updated = JobSpecBuilder::new().target("nightly.test").duration_secs(60).build();
    let saved = service
        .save_template("nightly", updated.clone(), &Requester::new("root"))
        .unwrap();
    assert_eq!(saved.owner, alice());
    assert_eq!(saved.spec, updated);

    let own = service.save_template("nightly", original.clone(), &alice()).unwrap();
    assert_eq!(own.spec, original);
    assert_eq!(service.list_templates().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_template_is_rejected() {
    let h = HarnessBuilder::new().build();
    let service = h.service(Duration::from_secs(2));
    let err = service
        .save_template("broken", JobSpecBuilder::new().rate(0).build(), &alice())
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Supervisor(SupervisorError::InvalidSpec(_))
    ));
    assert!(service.list_templates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_reuses_parameters_of_running_and_finished_jobs() {
    let h = HarnessBuilder::new().build();
    let service = h.service(Duration::from_secs(2));
    let spec = JobSpecBuilder::new().target("retry.test").threads(2).build();

    let first = service.start(spec.clone(), &alice(), None).unwrap();
    let retried_live = service.retry(first, &bob(), None).unwrap();
    assert_ne!(retried_live, first);
    let live = h.supervisor.get(retried_live).unwrap();
    assert_eq!(live.spec(), &spec);
    assert_eq!(live.owner(), &bob());

    let record = h.supervisor.get(first).unwrap();
    h.launcher.worker_for(first).unwrap().exit(0);
    with_timeout_of(LIMIT, record.wait_terminal()).await;
    assert!(h.supervisor.get(first).is_none());

    let retried_done = service.retry(first, &alice(), None).unwrap();
    assert_eq!(h.supervisor.get(retried_done).unwrap().spec(), &spec);

    let err = service.retry(JobId(7), &alice(), None).unwrap_err();
    assert!(matches!(err, ServiceError::NothingToRetry(JobId(7))));
}

#[tokio::test(start_paused = true)]
async fn history_and_stats_track_finished_jobs() {
    let h = HarnessBuilder::new().build();
    let service = h.service(Duration::from_secs(2));

    let mut ids = Vec::new();
    for target in ["one.test", "two.test"] {
        let id = service
            .start(JobSpecBuilder::new().target(target).build(), &alice(), None)
            .unwrap();
        let worker = h.launcher.worker_for(id).unwrap();
        worker.emit_status(&[("200", 10)]);
        worker.exit(0);
        with_timeout_of(LIMIT, h.supervisor.get(id).unwrap().wait_terminal()).await;
        ids.push(id);
    }
    let running = service
        .start(JobSpecBuilder::new().build(), &alice(), None)
        .unwrap();
    service
        .schedule(
            JobSpecBuilder::new().build(),
            &alice(),
            None,
            Duration::from_secs(60),
        )
        .unwrap();
    sleep(Duration::from_secs(3)).await;

    let history = service.history(10);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, ids[1]);
    assert_eq!(history[1].id, ids[0]);
    assert_eq!(history[0].target, "two.test");
    assert_eq!(history[0].outcome, JobOutcome::Completed);
    assert_eq!(service.history(1).len(), 1);

    let stats = service.stats();
    assert_eq!(stats.running, 1);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending_schedules, 1);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.completed_requests, 20);
    assert!(stats.uptime_secs >= 3);

    let health = service.health();
    assert_eq!(health.status, "ok");
    assert_eq!(health.running, 1);
    assert!(!health.version.is_empty());

    assert_eq!(service.list().len(), 1);
    assert_eq!(service.status(running).unwrap().job_id, running);
}

#[tokio::test(start_paused = true)]
async fn invalid_schedule_is_rejected_up_front() {
    let h = HarnessBuilder::new().build();
    let service = h.service(Duration::from_secs(2));

    let err = service
        .schedule(
            JobSpecBuilder::new().duration_secs(0).build(),
            &alice(),
            None,
            Duration::from_secs(5),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Supervisor(SupervisorError::InvalidSpec(_))
    ));

    let targets = vec!["ok.test".to_string(), " ".to_string()];
    let err = service
        .fan_out(&targets, &JobSpecBuilder::new().build(), &alice(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Supervisor(SupervisorError::InvalidSpec(_))
    ));
    assert!(service.pending_schedules().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_schedules_and_stops_jobs() {
    let h = HarnessBuilder::new().build();
    let service = h.service(Duration::from_secs(2));

    let id = service
        .start(JobSpecBuilder::new().build(), &alice(), None)
        .unwrap();
    service
        .schedule(
            JobSpecBuilder::new().build(),
            &alice(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();

    let left = service.shutdown(Duration::from_secs(30)).await;
    assert_eq!(left, 0);
    assert!(service.pending_schedules().is_empty());
    assert_eq!(service.history(5)[0].id, id);
    assert_eq!(service.history(5)[0].outcome, JobOutcome::Stopped);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.launcher.launched(), 1);
}
