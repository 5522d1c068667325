// src/job/record.rs

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::job::{JobOutcome, JobSpec};
use crate::progress::StatusCounts;
use crate::types::{Destination, JobId, Requester};

/// Consistent copy of a record's mutable fields, taken under one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub counters: StatusCounts,
    pub is_running: bool,
    pub stop_requested: bool,
    pub outcome: Option<JobOutcome>,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
}

/// State of one admitted job.
///
/// Identity and parameters are immutable. Counters and lifecycle flags sit
/// behind a single mutex so readers never see a half-applied update. The
/// worker process itself is not stored here: the job task owns it, and the
/// record only carries the stop signal towards that task.
#[derive(Debug)]
pub struct JobRecord {
    id: JobId,
    spec: JobSpec,
    owner: Requester,
    destination: Destination,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    state: Mutex<JobState>,
    stop_signal: Notify,
    terminal: watch::Sender<Option<JobOutcome>>,
}

impl JobRecord {
    pub fn new(id: JobId, spec: JobSpec, owner: Requester, destination: Destination) -> Self {
        let (terminal, _) = watch::channel(None);
        Self {
            id,
            spec,
            owner,
            destination,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            state: Mutex::new(JobState {
                counters: StatusCounts::default(),
                is_running: true,
                stop_requested: false,
                outcome: None,
                exit_code: None,
                pid: None,
            }),
            stop_signal: Notify::new(),
            terminal,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn owner(&self) -> &Requester {
        &self.owner
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn started_at_utc(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    /// Time since spawn, capped at the requested duration.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
            .min(self.spec.duration())
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> JobState {
        self.lock().clone()
    }

    pub fn counters(&self) -> StatusCounts {
        self.lock().counters.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }

    /// Replace the counters with a newer cumulative snapshot.
    ///
    /// Ignored once the job reached its terminal state.
    pub fn apply_counts(&self, counts: StatusCounts) {
        let mut state = self.lock();
        if state.outcome.is_none() {
            state.counters = counts;
        }
    }

    pub(crate) fn set_pid(&self, pid: Option<u32>) {
        self.lock().pid = pid;
    }

    /// Mark the job as stopping and wake its task.
    ///
    /// Returns `false` if a stop was already requested or the job already
    /// finished.
    pub fn request_stop(&self) -> bool {
        {
            let mut state = self.lock();
            if state.stop_requested || state.outcome.is_some() {
                return false;
            }
            state.stop_requested = true;
            state.is_running = false;
        }
        self.stop_signal.notify_one();
        true
    }

    /// Resolves once [`request_stop`](Self::request_stop) has been called.
    pub(crate) async fn stop_requested(&self) {
        self.stop_signal.notified().await;
    }

    /// Record the terminal outcome. Counters are frozen from here on.
    pub(crate) fn mark_finished(&self, outcome: JobOutcome, exit_code: Option<i32>) {
        let mut state = self.lock();
        state.is_running = false;
        state.outcome = Some(outcome);
        state.exit_code = exit_code;
        state.pid = None;
    }

    /// Publish the terminal outcome to everyone in [`wait_terminal`](Self::wait_terminal).
    pub(crate) fn announce_terminal(&self, outcome: JobOutcome) {
        self.terminal.send_replace(Some(outcome));
    }

    /// Wait until the job has been finalized and removed from the registry.
    pub async fn wait_terminal(&self) -> Option<JobOutcome> {
        let mut rx = self.terminal.subscribe();
        let result = rx.wait_for(|outcome| outcome.is_some()).await;
        result.ok().and_then(|outcome| *outcome)
    }
}
