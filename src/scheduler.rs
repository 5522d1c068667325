// src/scheduler.rs

//! Delayed and fanned-out admissions.
//!
//! Every scheduled admission is an entry in `pending` plus a timer task.
//! Whoever removes the entry from `pending` first owns it: the timer task
//! removes it right before submitting, `cancel` removes it to cancel. A
//! cancel racing a fire therefore produces either the job or the cancel,
//! never both and never neither.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::job::{JobRequest, JobSpec};
use crate::publish::{Notice, ProgressPublisher};
use crate::supervisor::{AccessPolicy, JobSubmitter, SupervisorError};
use crate::types::{Destination, IdSequence, JobId, Requester, ScheduleId};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule {0} not found (already fired or cancelled)")]
    NotFound(ScheduleId),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,

    #[error("delay of {0:?} is out of range")]
    InvalidDelay(Duration),
}

/// Public view of a pending admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSchedule {
    pub id: ScheduleId,
    pub target: String,
    pub owner: Requester,
    pub fires_at: DateTime<Utc>,
    pub fires_in_secs: u64,
}

/// Result of a scheduled admission once it fires.
pub type FireResult = Result<JobId, SupervisorError>;

/// Handle returned for every scheduled admission.
#[derive(Debug)]
pub struct ScheduledAdmission {
    pub id: ScheduleId,
    pub fires_in: Duration,
    outcome: oneshot::Receiver<FireResult>,
}

impl ScheduledAdmission {
    /// Wait for the admission to fire. `None` if it was cancelled.
    pub async fn outcome(self) -> Option<FireResult> {
        self.outcome.await.ok()
    }
}

struct PendingEntry {
    request: JobRequest,
    fires_at: Instant,
    fires_at_utc: DateTime<Utc>,
    cancel: oneshot::Sender<()>,
}

type PendingMap = Arc<Mutex<HashMap<ScheduleId, PendingEntry>>>;

pub struct Scheduler {
    submitter: Arc<dyn JobSubmitter>,
    publisher: Arc<ProgressPublisher>,
    access: Arc<dyn AccessPolicy>,
    stagger: Duration,
    ids: IdSequence,
    pending: PendingMap,
    closed: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("stagger", &self.stagger)
            .field("pending", &self.lock().len())
            .finish_non_exhaustive()
    }
}

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<ScheduleId, PendingEntry>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    pub fn new(
        submitter: Arc<dyn JobSubmitter>,
        publisher: Arc<ProgressPublisher>,
        access: Arc<dyn AccessPolicy>,
        stagger: Duration,
    ) -> Self {
        Self {
            submitter,
            publisher,
            access,
            stagger,
            ids: IdSequence::starting_now(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScheduleId, PendingEntry>> {
        lock_pending(&self.pending)
    }

    /// Admit `request` after `delay`.
    ///
    /// If the supervisor rejects it when it fires, the failure is delivered
    /// to the request's destination and returned through the handle. It is
    /// not retried.
    pub fn schedule_once(
        &self,
        request: JobRequest,
        delay: Duration,
    ) -> Result<ScheduledAdmission, SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let (fires_at, fires_at_utc) = fire_times(delay)?;
        let id = ScheduleId(self.ids.next());
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        info!(
            schedule_id = %id,
            target = %request.spec.target,
            owner = %request.owner,
            delay_secs = delay.as_secs(),
            "admission scheduled"
        );

        self.lock().insert(
            id,
            PendingEntry {
                request,
                fires_at,
                fires_at_utc,
                cancel: cancel_tx,
            },
        );

        tokio::spawn(fire_after(
            id,
            delay,
            cancel_rx,
            outcome_tx,
            Arc::clone(&self.pending),
            Arc::clone(&self.submitter),
            Arc::clone(&self.publisher),
        ));

        Ok(ScheduledAdmission {
            id,
            fires_in: delay,
            outcome: outcome_rx,
        })
    }

    /// One admission per target, the `i`-th delayed by `i * stagger`.
    pub fn fan_out(
        &self,
        targets: &[String],
        params: &JobSpec,
        owner: &Requester,
        destination: Option<Destination>,
    ) -> Result<Vec<ScheduledAdmission>, SchedulerError> {
        let delays: Vec<Duration> = (0..targets.len())
            .map(|index| self.stagger_for(index))
            .collect::<Result<_, _>>()?;
        if let Some(&last) = delays.last() {
            fire_times(last)?;
        }

        let mut handles = Vec::with_capacity(targets.len());
        for (target, delay) in targets.iter().zip(delays) {
            let mut request = JobRequest::new(params.with_target(target.clone()), owner.clone());
            request.destination = destination.clone();
            handles.push(self.schedule_once(request, delay)?);
        }
        info!(targets = targets.len(), owner = %owner, "fan-out scheduled");
        Ok(handles)
    }

    fn stagger_for(&self, index: usize) -> Result<Duration, SchedulerError> {
        u32::try_from(index)
            .ok()
            .and_then(|n| self.stagger.checked_mul(n))
            .ok_or(SchedulerError::InvalidDelay(self.stagger))
    }

    /// Cancel a pending admission. Only its owner or an admin may do so.
    pub fn cancel(&self, id: ScheduleId, requester: &Requester) -> Result<(), SchedulerError> {
        let entry = {
            let mut pending = self.lock();
            let entry = pending.get(&id).ok_or(SchedulerError::NotFound(id))?;
            if !self.access.may_control(requester, &entry.request.owner) {
                return Err(SchedulerError::Forbidden(format!(
                    "{requester} may not cancel schedule {id}"
                )));
            }
            pending.remove(&id).ok_or(SchedulerError::NotFound(id))?
        };

        // The timer task may already be past its sleep; it will find the
        // entry gone and do nothing.
        let _ = entry.cancel.send(());
        info!(schedule_id = %id, requester = %requester, "scheduled admission cancelled");
        Ok(())
    }

    /// Pending admissions ordered by fire time.
    pub fn pending(&self) -> Vec<PendingSchedule> {
        let now = Instant::now();
        let mut list: Vec<PendingSchedule> = self
            .lock()
            .iter()
            .map(|(id, entry)| PendingSchedule {
                id: *id,
                target: entry.request.spec.target.clone(),
                owner: entry.request.owner.clone(),
                fires_at: entry.fires_at_utc,
                fires_in_secs: entry.fires_at.saturating_duration_since(now).as_secs(),
            })
            .collect();
        list.sort_by_key(|p| (p.fires_at, p.id));
        list
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Refuse new schedules and cancel every pending one. Returns how many
    /// were cancelled.
    pub fn shutdown(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<PendingEntry> = self.lock().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.cancel.send(());
        }
        info!(cancelled = count, "scheduler shut down");
        count
    }
}

/// Monotonic and wall-clock fire times for `delay` from now.
fn fire_times(delay: Duration) -> Result<(Instant, DateTime<Utc>), SchedulerError> {
    let fires_at = Instant::now().checked_add(delay);
    let fires_at_utc = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d));
    match (fires_at, fires_at_utc) {
        (Some(at), Some(utc)) => Ok((at, utc)),
        _ => Err(SchedulerError::InvalidDelay(delay)),
    }
}

async fn fire_after(
    id: ScheduleId,
    delay: Duration,
    cancel_rx: oneshot::Receiver<()>,
    outcome_tx: oneshot::Sender<FireResult>,
    pending: PendingMap,
    submitter: Arc<dyn JobSubmitter>,
    publisher: Arc<ProgressPublisher>,
) {
    tokio::select! {
        () = sleep(delay) => {}
        _ = cancel_rx => {
            debug!(schedule_id = %id, "timer task cancelled");
            return;
        }
    }

    // Claim the entry; if it's gone, a cancel won the race.
    let Some(entry) = lock_pending(&pending).remove(&id) else {
        debug!(schedule_id = %id, "schedule cancelled before firing");
        return;
    };

    let request = entry.request;
    let destination = request
        .destination
        .clone()
        .unwrap_or_else(|| Destination::from(&request.owner));
    let target = request.spec.target.clone();

    let result = submitter.submit(request).map(|record| record.id());
    match &result {
        Ok(job_id) => info!(schedule_id = %id, job_id = %job_id, "scheduled admission fired"),
        Err(err) => {
            warn!(schedule_id = %id, target = %target, error = %err, "scheduled admission failed");
            publisher
                .notify(
                    &destination,
                    Notice::ScheduleFailed {
                        schedule_id: id,
                        target,
                        reason: err.to_string(),
                    },
                )
                .await;
        }
    }

    let _ = outcome_tx.send(result);
}
