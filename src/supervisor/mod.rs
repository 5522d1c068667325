// src/supervisor/mod.rs

//! Process supervisor.
//!
//! Admission, spawning and control of worker processes. Each admitted job
//! gets its own Tokio task ([`job_task`]) which owns the worker process and
//! is the only writer of the job's counters and lifecycle. Callers interact
//! through [`ProcessSupervisor`], which only touches the registry and the
//! record's stop signal, so one job's failure can never block another.

pub mod access;
mod job_task;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::history::HistorySink;
use crate::job::{JobRecord, JobRegistry, JobRequest};
use crate::progress::StatusLineParser;
use crate::publish::{ProgressPublisher, Snapshot};
use crate::types::{Destination, IdSequence, JobId, Requester};
use crate::worker::{WorkerInvocation, WorkerLauncher, WorkerSettings};

pub use access::{AccessPolicy, AdminList};

/// Errors surfaced synchronously to callers.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("admission rejected: {max} jobs already running")]
    AdmissionRejected { max: usize },

    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("invalid job: {0}")]
    InvalidSpec(String),
}

/// Runtime settings of the supervisor, resolved from configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Admission cap on simultaneously running jobs.
    pub max_concurrent: usize,
    /// Added to a job's duration to form its hard deadline.
    pub grace: Duration,
    /// How long a worker gets to honour an interrupt before it is killed.
    pub kill_grace: Duration,
    /// Success-rate percent above which a nonzero exit counts as partial.
    pub partial_threshold: u8,
    pub max_duration_secs: u64,
    /// Interval between progress publications for each job.
    pub publish_interval: Duration,
    pub worker: WorkerSettings,
}

/// The single entry point through which every job is admitted, whether it
/// comes from a direct start, a template, a retry or a scheduled fire.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, request: JobRequest) -> Result<Arc<JobRecord>, SupervisorError>;
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    parser: StatusLineParser,
    registry: Arc<JobRegistry>,
    launcher: Arc<dyn WorkerLauncher>,
    publisher: Arc<ProgressPublisher>,
    history: Vec<Arc<dyn HistorySink>>,
    access: Arc<dyn AccessPolicy>,
    ids: IdSequence,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(
        config: SupervisorConfig,
        parser: StatusLineParser,
        launcher: Arc<dyn WorkerLauncher>,
        publisher: Arc<ProgressPublisher>,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            config,
            parser,
            registry: Arc::new(JobRegistry::new()),
            launcher,
            publisher,
            history: Vec::new(),
            access,
            ids: IdSequence::starting_now(),
        }
    }

    /// Add a sink that receives one record per finished job.
    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history.push(sink);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn access(&self) -> &Arc<dyn AccessPolicy> {
        &self.access
    }

    pub fn publisher(&self) -> &Arc<ProgressPublisher> {
        &self.publisher
    }

    /// Admit and start one job.
    ///
    /// On success the record is registered, the worker is running, and the
    /// job task (stream consumption, ticker, deadline) is live. On failure
    /// nothing is left behind in the registry.
    pub fn spawn(&self, request: JobRequest) -> Result<Arc<JobRecord>, SupervisorError> {
        let JobRequest {
            spec,
            owner,
            destination,
        } = request;

        spec.validate(self.config.max_duration_secs)
            .map_err(SupervisorError::InvalidSpec)?;

        let id = JobId(self.ids.next());
        let destination = destination.unwrap_or_else(|| Destination::from(&owner));
        let record = Arc::new(JobRecord::new(id, spec, owner, destination));

        if !self
            .registry
            .try_admit(self.config.max_concurrent, Arc::clone(&record))
        {
            warn!(
                job_id = %id,
                max = self.config.max_concurrent,
                "job rejected: concurrency cap reached"
            );
            return Err(SupervisorError::AdmissionRejected {
                max: self.config.max_concurrent,
            });
        }

        let invocation = WorkerInvocation::build(&self.config.worker, record.spec());
        let worker = match self.launcher.launch(id, &invocation) {
            Ok(worker) => worker,
            Err(source) => {
                self.registry.remove(id);
                warn!(
                    job_id = %id,
                    program = %invocation.program,
                    error = %source,
                    "failed to spawn worker"
                );
                return Err(SupervisorError::Spawn {
                    program: invocation.program,
                    source,
                });
            }
        };
        record.set_pid(worker.process.id());

        info!(
            job_id = %id,
            target = %record.spec().target,
            duration_secs = record.spec().duration_secs,
            owner = %record.owner(),
            "job started"
        );

        let ctx = job_task::JobContext {
            parser: self.parser.clone(),
            registry: Arc::clone(&self.registry),
            publisher: Arc::clone(&self.publisher),
            history: self.history.clone(),
            timeout_grace: self.config.grace,
            kill_grace: self.config.kill_grace,
            partial_threshold: self.config.partial_threshold,
            publish_interval: self.config.publish_interval,
        };
        tokio::spawn(job_task::run_job(ctx, Arc::clone(&record), worker));

        Ok(record)
    }

    /// Request a graceful stop of one job.
    ///
    /// The job is marked not running immediately; the worker gets an
    /// interrupt and, if it ignores it, is killed after the kill grace.
    /// Finalization happens asynchronously in the job task.
    pub fn stop(&self, id: JobId, requester: &Requester) -> Result<(), SupervisorError> {
        let record = self
            .registry
            .get(id)
            .ok_or(SupervisorError::NotFound(id))?;

        if !self.access.may_control(requester, record.owner()) {
            return Err(SupervisorError::Forbidden(format!(
                "{requester} may not stop job {id} owned by {}",
                record.owner()
            )));
        }

        if record.request_stop() {
            info!(job_id = %id, requester = %requester, "stop requested");
        }
        Ok(())
    }

    /// Stop every running job. Administrators only. Returns how many jobs
    /// were asked to stop.
    pub fn stop_all(&self, requester: &Requester) -> Result<usize, SupervisorError> {
        if !self.access.is_admin(requester) {
            return Err(SupervisorError::Forbidden(format!(
                "{requester} may not stop all jobs"
            )));
        }

        let mut stopped = 0;
        self.registry.for_each_running(|record| {
            if record.request_stop() {
                stopped += 1;
            }
        });
        info!(requester = %requester, stopped, "stop-all requested");
        Ok(stopped)
    }

    pub fn status(&self, id: JobId) -> Result<Snapshot, SupervisorError> {
        let record = self
            .registry
            .get(id)
            .ok_or(SupervisorError::NotFound(id))?;
        Ok(self.publisher.snapshot(&record))
    }

    pub fn list(&self) -> Vec<Snapshot> {
        self.registry
            .records()
            .iter()
            .map(|record| self.publisher.snapshot(record))
            .collect()
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.registry.get(id)
    }

    pub fn running_count(&self) -> usize {
        self.registry.running_count()
    }

    pub fn total_count(&self) -> usize {
        self.registry.count()
    }

    /// Stop everything and wait up to `timeout` for the jobs to finalize.
    /// Returns the number of jobs still registered afterwards.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let records = self.registry.records();
        for record in &records {
            record.request_stop();
        }
        info!(jobs = records.len(), "supervisor draining");

        let drain = async {
            for record in &records {
                record.wait_terminal().await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(?timeout, "supervisor drain timed out");
        }
        self.registry.count()
    }
}

impl JobSubmitter for ProcessSupervisor {
    fn submit(&self, request: JobRequest) -> Result<Arc<JobRecord>, SupervisorError> {
        self.spawn(request)
    }
}
