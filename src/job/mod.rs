// src/job/mod.rs

//! Job data model.
//!
//! - [`JobSpec`]: caller-supplied parameters passed through to the worker.
//! - [`record::JobRecord`]: mutable state of one admitted job.
//! - [`registry::JobRegistry`]: the set of admitted jobs and the admission cap.

pub mod record;
pub mod registry;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::progress::StatusCounts;
use crate::types::{Destination, Requester};

pub use record::JobRecord;
pub use registry::JobRegistry;

/// Parameters of one job. The supervisor never interprets them beyond
/// `duration_secs`; the rest goes to the worker verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub target: String,
    pub duration_secs: u64,
    pub rate: u32,
    pub threads: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl JobSpec {
    pub fn new(target: impl Into<String>, duration_secs: u64, rate: u32, threads: u32) -> Self {
        Self {
            target: target.into(),
            duration_secs,
            rate,
            threads,
            extra_args: Vec::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Same parameters against a different target (used by fan-out).
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..self.clone()
        }
    }

    pub fn validate(&self, max_duration_secs: u64) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target must not be empty".to_string());
        }
        if self.duration_secs == 0 {
            return Err("duration must be > 0 seconds".to_string());
        }
        if self.duration_secs > max_duration_secs {
            return Err(format!(
                "duration {}s exceeds the maximum of {}s",
                self.duration_secs, max_duration_secs
            ));
        }
        if self.rate == 0 {
            return Err("rate must be > 0".to_string());
        }
        if self.threads == 0 {
            return Err("threads must be > 0".to_string());
        }
        Ok(())
    }
}

/// Everything needed to admit a job: the parameters plus who asked and
/// where progress should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub spec: JobSpec,
    pub owner: Requester,
    /// Defaults to the owner's own id when `None`.
    pub destination: Option<Destination>,
}

impl JobRequest {
    pub fn new(spec: JobSpec, owner: Requester) -> Self {
        Self {
            spec,
            owner,
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Worker exited 0.
    Completed,
    /// Nonzero exit, but the success rate was above the partial threshold.
    Partial,
    /// Nonzero exit with traffic at or below the partial threshold.
    Failed,
    /// Nonzero exit and nothing was ever observed.
    Crashed,
    /// The deadline passed and the worker was terminated.
    TimedOut,
    /// Stopped on request.
    Stopped,
}

impl JobOutcome {
    /// Classify a worker that exited on its own.
    ///
    /// `exit_code` is `None` when the process was killed by a signal, which
    /// counts as a nonzero exit.
    pub fn classify(exit_code: Option<i32>, counts: &StatusCounts, partial_threshold: u8) -> Self {
        match exit_code {
            Some(0) => JobOutcome::Completed,
            _ if counts.total() > 0 => {
                if counts.success_rate() > partial_threshold {
                    JobOutcome::Partial
                } else {
                    JobOutcome::Failed
                }
            }
            _ => JobOutcome::Crashed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Partial => "partial",
            JobOutcome::Failed => "failed",
            JobOutcome::Crashed => "crashed",
            JobOutcome::TimedOut => "timed_out",
            JobOutcome::Stopped => "stopped",
        }
    }
}
