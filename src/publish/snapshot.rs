// src/publish/snapshot.rs

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::job::{JobOutcome, JobRecord};
use crate::types::{JobId, Requester, ScheduleId};

/// Lifecycle phase shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Running,
    /// Stop requested or deadline hit; waiting for the worker to exit.
    Stopping,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeCount {
    pub code: String,
    pub count: u64,
}

/// Point-in-time view of a job, suitable for delivery to an observer or
/// for answering a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub job_id: JobId,
    pub target: String,
    pub owner: Requester,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// OS process id of the worker, while it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub percent: u8,
    pub elapsed_secs: u64,
    pub duration_secs: u64,
    pub rate: u32,
    pub threads: u32,
    pub total: u64,
    pub success: u64,
    pub fail: u64,
    pub success_rate: u8,
    pub top_codes: Vec<CodeCount>,
}

impl Snapshot {
    /// Capture the record as it is right now.
    pub fn capture(record: &JobRecord, now: Instant, top_n: usize) -> Self {
        let state = record.state();
        let elapsed = record.elapsed(now);
        let spec = record.spec();

        let phase = if state.outcome.is_some() {
            Phase::Finished
        } else if state.is_running {
            Phase::Running
        } else {
            Phase::Stopping
        };

        Self {
            job_id: record.id(),
            target: spec.target.clone(),
            owner: record.owner().clone(),
            phase,
            outcome: state.outcome,
            exit_code: state.exit_code,
            pid: state.pid,
            percent: progress_percent(elapsed, spec.duration_secs),
            elapsed_secs: elapsed.as_secs(),
            duration_secs: spec.duration_secs,
            rate: spec.rate,
            threads: spec.threads,
            total: state.counters.total(),
            success: state.counters.success(),
            fail: state.counters.fail(),
            success_rate: state.counters.success_rate(),
            top_codes: state
                .counters
                .top_codes(top_n)
                .into_iter()
                .map(|(code, count)| CodeCount { code, count })
                .collect(),
        }
    }

    /// The terminal view: final counters at 100%.
    pub fn terminal(record: &JobRecord, now: Instant, top_n: usize) -> Self {
        let mut snapshot = Self::capture(record, now, top_n);
        snapshot.percent = 100;
        snapshot
    }
}

/// `floor(elapsed / duration * 100)`, capped at 100. Elapsed is counted in
/// whole seconds.
pub fn progress_percent(elapsed: Duration, duration_secs: u64) -> u8 {
    if duration_secs == 0 {
        return 100;
    }
    let elapsed = elapsed.as_secs().min(duration_secs);
    (elapsed.saturating_mul(100) / duration_secs).min(100) as u8
}

/// What gets handed to a [`SnapshotSink`](super::SnapshotSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Progress(Snapshot),
    Final(Snapshot),
    /// A scheduled admission fired but could not be admitted.
    ScheduleFailed {
        schedule_id: ScheduleId,
        target: String,
        reason: String,
    },
}

impl Notice {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Notice::Progress(s) | Notice::Final(s) => Some(s.job_id),
            Notice::ScheduleFailed { .. } => None,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Notice::Progress(s) | Notice::Final(s) => Some(s),
            Notice::ScheduleFailed { .. } => None,
        }
    }
}
