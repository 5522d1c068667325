// src/service.rs

//! Caller-facing facade.
//!
//! [`JobService`] owns the supervisor, the scheduler, saved templates and
//! the recent-history ring, and exposes the operations every transport
//! (HTTP today) maps onto. Every way of starting a job ends up in
//! [`JobSubmitter::submit`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

use crate::config::ConfigFile;
use crate::errors::{JobvisorError, Result};
use crate::history::{HistoryEntry, JsonlHistory, MemoryHistory};
use crate::job::{JobRequest, JobSpec};
use crate::progress::StatusLineParser;
use crate::publish::{ProgressPublisher, Snapshot, SnapshotSink};
use crate::scheduler::{PendingSchedule, ScheduledAdmission, Scheduler, SchedulerError};
use crate::supervisor::{AdminList, JobSubmitter, ProcessSupervisor, SupervisorError};
use crate::types::{Destination, JobId, Requester, ScheduleId};
use crate::worker::WorkerLauncher;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("no parameters on record for job {0}")]
    NothingToRetry(JobId),
}

/// A saved, named parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub spec: JobSpec,
    pub owner: Requester,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub running: usize,
    pub total: usize,
    pub pending_schedules: usize,
    pub completed: usize,
    pub completed_requests: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub running: usize,
    pub total: usize,
    pub uptime_secs: u64,
}

pub struct JobService {
    supervisor: Arc<ProcessSupervisor>,
    scheduler: Scheduler,
    templates: Mutex<BTreeMap<String, Template>>,
    recent: Arc<MemoryHistory>,
    started: Instant,
}

impl std::fmt::Debug for JobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService")
            .field("supervisor", &self.supervisor)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl JobService {
    /// Wire a service from validated configuration.
    pub fn from_config(
        cfg: &ConfigFile,
        launcher: Arc<dyn WorkerLauncher>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Result<Self> {
        let parser = StatusLineParser::new(&cfg.worker.marker).map_err(|e| {
            JobvisorError::ConfigError(format!("invalid [worker].marker: {e}"))
        })?;

        let publisher = Arc::new(ProgressPublisher::new(
            sink,
            cfg.publisher.throttle_policy(),
            cfg.publisher.top_codes,
        ));
        let access = Arc::new(AdminList::new(cfg.access.admins.iter().cloned()));
        let recent = Arc::new(MemoryHistory::new(cfg.history.memory_capacity));

        let mut supervisor = ProcessSupervisor::new(
            cfg.supervisor_config(),
            parser,
            launcher,
            Arc::clone(&publisher),
            access.clone(),
        )
        .with_history(recent.clone());
        if let Some(ref path) = cfg.history.path {
            supervisor = supervisor.with_history(Arc::new(JsonlHistory::new(path)));
        }

        Ok(Self::new(
            Arc::new(supervisor),
            recent,
            cfg.scheduler.stagger(),
        ))
    }

    /// Assemble from parts. `recent` should also be registered as a history
    /// sink on `supervisor` for retry and history listing to work.
    pub fn new(supervisor: Arc<ProcessSupervisor>, recent: Arc<MemoryHistory>, stagger: Duration) -> Self {
        let scheduler = Scheduler::new(
            supervisor.clone(),
            Arc::clone(supervisor.publisher()),
            Arc::clone(supervisor.access()),
            stagger,
        );
        Self {
            supervisor,
            scheduler,
            templates: Mutex::new(BTreeMap::new()),
            recent,
            started: Instant::now(),
        }
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn templates(&self) -> MutexGuard<'_, BTreeMap<String, Template>> {
        self.templates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, request: JobRequest) -> std::result::Result<JobId, ServiceError> {
        Ok(self.supervisor.submit(request)?.id())
    }

    pub fn start(
        &self,
        spec: JobSpec,
        requester: &Requester,
        destination: Option<Destination>,
    ) -> std::result::Result<JobId, ServiceError> {
        let mut request = JobRequest::new(spec, requester.clone());
        request.destination = destination;
        self.submit(request)
    }

    pub fn stop(&self, id: JobId, requester: &Requester) -> std::result::Result<(), ServiceError> {
        Ok(self.supervisor.stop(id, requester)?)
    }

    pub fn stop_all(&self, requester: &Requester) -> std::result::Result<usize, ServiceError> {
        Ok(self.supervisor.stop_all(requester)?)
    }

    pub fn status(&self, id: JobId) -> std::result::Result<Snapshot, ServiceError> {
        Ok(self.supervisor.status(id)?)
    }

    pub fn list(&self) -> Vec<Snapshot> {
        self.supervisor.list()
    }

    pub fn schedule(
        &self,
        spec: JobSpec,
        requester: &Requester,
        destination: Option<Destination>,
        delay: Duration,
    ) -> std::result::Result<ScheduledAdmission, ServiceError> {
        spec.validate(self.supervisor.config().max_duration_secs)
            .map_err(SupervisorError::InvalidSpec)?;
        let mut request = JobRequest::new(spec, requester.clone());
        request.destination = destination;
        Ok(self.scheduler.schedule_once(request, delay)?)
    }

    pub fn fan_out(
        &self,
        targets: &[String],
        params: &JobSpec,
        requester: &Requester,
        destination: Option<Destination>,
    ) -> std::result::Result<Vec<ScheduledAdmission>, ServiceError> {
        for target in targets {
            params
                .with_target(target.clone())
                .validate(self.supervisor.config().max_duration_secs)
                .map_err(SupervisorError::InvalidSpec)?;
        }
        Ok(self.scheduler.fan_out(targets, params, requester, destination)?)
    }

    pub fn cancel_schedule(
        &self,
        id: ScheduleId,
        requester: &Requester,
    ) -> std::result::Result<(), ServiceError> {
        Ok(self.scheduler.cancel(id, requester)?)
    }

    pub fn pending_schedules(&self) -> Vec<PendingSchedule> {
        self.scheduler.pending()
    }

    /// Save a template. Overwriting an existing name is limited to its owner
    /// or an admin, and the template keeps its original owner.
    pub fn save_template(
        &self,
        name: &str,
        spec: JobSpec,
        requester: &Requester,
    ) -> std::result::Result<Template, ServiceError> {
        spec.validate(self.supervisor.config().max_duration_secs)
            .map_err(SupervisorError::InvalidSpec)?;
        let mut templates = self.templates();
        // Overwriting keeps the existing owner-or-admin rule.
        let owner = match templates.get(name) {
            Some(existing) => {
                if !self
                    .supervisor
                    .access()
                    .may_control(requester, &existing.owner)
                {
                    return Err(SupervisorError::Forbidden(format!(
                        "{requester} may not overwrite template '{name}'"
                    ))
                    .into());
                }
                existing.owner.clone()
            }
            None => requester.clone(),
        };
        let template = Template {
            name: name.to_string(),
            spec,
            owner,
        };
        templates.insert(name.to_string(), template.clone());
        drop(templates);
        info!(template = %name, owner = %requester, "template saved");
        Ok(template)
    }

    pub fn list_templates(&self) -> Vec<Template> {
        self.templates().values().cloned().collect()
    }

    pub fn delete_template(
        &self,
        name: &str,
        requester: &Requester,
    ) -> std::result::Result<(), ServiceError> {
        let mut templates = self.templates();
        let template = templates
            .get(name)
            .ok_or_else(|| ServiceError::TemplateNotFound(name.to_string()))?;
        if !self
            .supervisor
            .access()
            .may_control(requester, &template.owner)
        {
            return Err(SupervisorError::Forbidden(format!(
                "{requester} may not delete template '{name}'"
            ))
            .into());
        }
        templates.remove(name);
        Ok(())
    }

    pub fn launch_template(
        &self,
        name: &str,
        requester: &Requester,
        destination: Option<Destination>,
    ) -> std::result::Result<JobId, ServiceError> {
        let spec = self
            .templates()
            .get(name)
            .map(|t| t.spec.clone())
            .ok_or_else(|| ServiceError::TemplateNotFound(name.to_string()))?;
        self.start(spec, requester, destination)
    }

    /// Run a job again with the same parameters. The new job belongs to
    /// `requester`.
    pub fn retry(
        &self,
        id: JobId,
        requester: &Requester,
        destination: Option<Destination>,
    ) -> std::result::Result<JobId, ServiceError> {
        let spec = match self.supervisor.get(id) {
            Some(record) => record.spec().clone(),
            None => self
                .recent
                .find(id)
                .map(|entry| entry.spec())
                .ok_or(ServiceError::NothingToRetry(id))?,
        };
        info!(job_id = %id, requester = %requester, "retrying job");
        self.start(spec, requester, destination)
    }

    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.recent.recent(limit)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            running: self.supervisor.running_count(),
            total: self.supervisor.total_count(),
            pending_schedules: self.scheduler.pending_count(),
            completed: self.recent.len(),
            completed_requests: self.recent.total_requests(),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            running: self.supervisor.running_count(),
            total: self.supervisor.total_count(),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    /// Cancel pending schedules, stop all jobs and wait up to `timeout` for
    /// them to finish. Returns the number of jobs that did not finalize.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.scheduler.shutdown();
        self.supervisor.shutdown(timeout).await
    }
}
