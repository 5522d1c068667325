// src/supervisor/job_task.rs

//! Per-job event loop.
//!
//! One Tokio task per job owns the worker process and serialises every
//! event for that job: stdout lines, publisher ticks, the deadline, stop
//! requests, the kill escalation and the exit. Progress deliveries run in a
//! companion task fed through a `watch` channel; a slow observer must not
//! delay the deadline or the kill. Because the exit is handled
//! in the same task that applies counter updates, finalization always sees
//! every update that came before it.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::history::{HistoryEntry, HistorySink};
use crate::job::{JobOutcome, JobRecord, JobRegistry};
use crate::progress::StatusLineParser;
use crate::publish::{JobThrottle, ProgressPublisher, Snapshot};
use crate::types::{Destination, JobId};
use crate::worker::{LaunchedWorker, WorkerProcess};

/// How long to keep reading stdout after the worker exited, for lines that
/// were still in the pipe.
const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on one history sink write.
const HISTORY_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct JobContext {
    pub parser: StatusLineParser,
    pub registry: Arc<JobRegistry>,
    pub publisher: Arc<ProgressPublisher>,
    pub history: Vec<Arc<dyn HistorySink>>,
    pub timeout_grace: Duration,
    pub kill_grace: Duration,
    pub partial_threshold: u8,
    pub publish_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndCause {
    Exited,
    Stopped,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    None,
    Interrupted { kill_at: Instant },
    Killed,
}

pub(crate) async fn run_job(ctx: JobContext, record: Arc<JobRecord>, worker: LaunchedWorker) {
    let LaunchedWorker {
        mut process,
        mut stdout,
    } = worker;
    let id = record.id();

    let deadline = sleep_until(record.started_at() + record.spec().duration() + ctx.timeout_grace);
    tokio::pin!(deadline);

    let mut ticker = interval_at(
        record.started_at() + ctx.publish_interval,
        ctx.publish_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut throttle = JobThrottle::default();
    let (progress_tx, progress_rx) = watch::channel(None);
    let delivery = tokio::spawn(deliver_progress(
        Arc::clone(&ctx.publisher),
        record.destination().clone(),
        progress_rx,
    ));
    let mut stdout_open = true;
    let mut cause = EndCause::Exited;
    let mut teardown = Teardown::None;

    let exit_code = loop {
        let kill_at = match teardown {
            Teardown::Interrupted { kill_at } => Some(kill_at),
            Teardown::None | Teardown::Killed => None,
        };
        let accepting_stop = teardown == Teardown::None;

        tokio::select! {
            line = stdout.recv(), if stdout_open => match line {
                Some(line) => apply_line(&ctx.parser, &record, &line),
                None => {
                    debug!(job_id = %id, "worker stdout closed");
                    stdout_open = false;
                }
            },

            status = process.wait() => match status {
                Ok(code) => break code,
                Err(err) => {
                    error!(job_id = %id, error = %err, "failed waiting for worker; killing it");
                    if let Err(err) = process.kill().await {
                        warn!(job_id = %id, error = %err, "failed to kill worker");
                    }
                    break None;
                }
            },

            _ = ticker.tick() => {
                if record.is_running() {
                    if let Some(snapshot) = ctx.publisher.progress_due(&record, &mut throttle) {
                        progress_tx.send_replace(Some(snapshot));
                    }
                }
            }

            () = &mut deadline, if accepting_stop => {
                warn!(
                    job_id = %id,
                    duration_secs = record.spec().duration_secs,
                    "job deadline exceeded; terminating worker"
                );
                cause = EndCause::TimedOut;
                record.request_stop();
                teardown = interrupt(process.as_mut(), id, ctx.kill_grace);
            }

            () = record.stop_requested(), if accepting_stop => {
                info!(job_id = %id, "interrupting worker on stop request");
                cause = EndCause::Stopped;
                teardown = interrupt(process.as_mut(), id, ctx.kill_grace);
            }

            () = sleep_until_opt(kill_at), if kill_at.is_some() => {
                warn!(job_id = %id, "worker ignored interrupt; killing it");
                if let Err(err) = process.kill().await {
                    warn!(job_id = %id, error = %err, "failed to kill worker");
                }
                teardown = Teardown::Killed;
            }
        }
    };

    if stdout_open {
        let drain = async {
            while let Some(line) = stdout.recv().await {
                apply_line(&ctx.parser, &record, &line);
            }
        };
        if tokio::time::timeout(STDOUT_DRAIN_TIMEOUT, drain).await.is_err() {
            debug!(job_id = %id, "stdout still open after exit; dropping the rest");
        }
    }
    drop(stdout);

    // The final snapshot must not overtake a progress delivery.
    drop(progress_tx);
    if let Err(err) = delivery.await {
        warn!(job_id = %id, error = %err, "progress delivery task failed");
    }

    finalize(&ctx, &record, cause, exit_code).await;
}

/// Deliver the newest pending progress snapshot, one at a time, until the
/// job loop drops its sender. Snapshots superseded while a delivery is in
/// flight are skipped.
async fn deliver_progress(
    publisher: Arc<ProgressPublisher>,
    destination: Destination,
    mut pending: watch::Receiver<Option<Snapshot>>,
) {
    while pending.changed().await.is_ok() {
        let next = pending.borrow_and_update().clone();
        if let Some(snapshot) = next {
            publisher.deliver_progress(&destination, snapshot).await;
        }
    }
}

/// Send an interrupt and arm the kill escalation.
fn interrupt(process: &mut dyn WorkerProcess, id: JobId, kill_grace: Duration) -> Teardown {
    match process.interrupt() {
        Ok(()) => Teardown::Interrupted {
            kill_at: Instant::now() + kill_grace,
        },
        Err(err) => {
            warn!(job_id = %id, error = %err, "failed to interrupt worker; killing now");
            Teardown::Interrupted {
                kill_at: Instant::now(),
            }
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

fn apply_line(parser: &StatusLineParser, record: &JobRecord, line: &str) {
    if let Some(counts) = parser.parse(line) {
        debug!(
            job_id = %record.id(),
            total = counts.total(),
            success = counts.success(),
            "progress update"
        );
        record.apply_counts(counts);
    }
}

/// Classify, persist, publish the final snapshot, then deregister.
async fn finalize(ctx: &JobContext, record: &JobRecord, cause: EndCause, exit_code: Option<i32>) {
    let id = record.id();
    let state = record.state();
    let counters = state.counters;

    let outcome = match cause {
        EndCause::TimedOut => JobOutcome::TimedOut,
        EndCause::Stopped => JobOutcome::Stopped,
        EndCause::Exited if state.stop_requested => JobOutcome::Stopped,
        EndCause::Exited => JobOutcome::classify(exit_code, &counters, ctx.partial_threshold),
    };
    record.mark_finished(outcome, exit_code);

    info!(
        job_id = %id,
        outcome = outcome.label(),
        exit_code = ?exit_code,
        total = counters.total(),
        success = counters.success(),
        fail = counters.fail(),
        success_rate = counters.success_rate(),
        elapsed_secs = Instant::now().saturating_duration_since(record.started_at()).as_secs(),
        "job finished"
    );

    if !ctx.history.is_empty() {
        let spec = record.spec();
        let entry = HistoryEntry {
            id,
            target: spec.target.clone(),
            duration_secs: spec.duration_secs,
            total_requests: counters.total(),
            success_count: counters.success(),
            fail_count: counters.fail(),
            rate: spec.rate,
            threads: spec.threads,
            completed_at: Utc::now(),
            owner: record.owner().clone(),
            outcome,
            extra_args: spec.extra_args.clone(),
        };
        for sink in &ctx.history {
            match timeout(HISTORY_WRITE_TIMEOUT, sink.record(&entry)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(job_id = %id, error = %err, "failed to write history entry");
                }
                Err(_) => {
                    warn!(job_id = %id, timeout = ?HISTORY_WRITE_TIMEOUT, "history write timed out");
                }
            }
        }
    }

    ctx.publisher.publish_final(record).await;
    ctx.registry.remove(id);
    record.announce_terminal(outcome);
}
