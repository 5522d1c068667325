// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::publish::ThrottlePolicy;
use crate::supervisor::SupervisorConfig;
use crate::worker::WorkerSettings;

/// Raw configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// max_concurrent = 3
///
/// [worker]
/// program = "node"
/// args = ["worker.cjs"]
///
/// [access]
/// admins = ["alice"]
/// ```
///
/// All sections are optional and have reasonable defaults. Use
/// `ConfigFile::try_from(raw)` to obtain a validated config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub publisher: PublisherSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub history: HistorySection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on the invariants checked there.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub worker: WorkerSection,
    pub publisher: PublisherSection,
    pub scheduler: SchedulerSection,
    pub history: HistorySection,
    pub access: AccessSection,
    pub server: ServerSection,
    bind: SocketAddr,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, bind: SocketAddr) -> Self {
        Self {
            supervisor: raw.supervisor,
            worker: raw.worker,
            publisher: raw.publisher,
            scheduler: raw.scheduler,
            history: raw.history,
            access: raw.access,
            server: raw.server,
            bind,
        }
    }

    /// Parsed `[server].bind`.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Runtime settings for the process supervisor.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            max_concurrent: self.supervisor.max_concurrent,
            grace: Duration::from_secs(self.supervisor.grace_secs),
            kill_grace: Duration::from_secs(self.supervisor.kill_grace_secs),
            partial_threshold: self.supervisor.partial_threshold,
            max_duration_secs: self.supervisor.max_duration_secs,
            publish_interval: self.publisher.interval(),
            worker: self.worker.settings(),
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Added to a job's duration to form its hard deadline.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,

    /// Success-rate percent above which a nonzero exit is reported as
    /// partial rather than failed.
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: u8,

    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_grace_secs() -> u64 {
    30
}

fn default_kill_grace_secs() -> u64 {
    5
}

fn default_partial_threshold() -> u8 {
    50
}

fn default_max_duration_secs() -> u64 {
    3600
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            grace_secs: default_grace_secs(),
            kill_grace_secs: default_kill_grace_secs(),
            partial_threshold: default_partial_threshold(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

/// `[worker]` section: how the worker executable is invoked and how its
/// progress lines are recognised.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Passed verbatim as the fifth positional argument. Set to an empty
    /// string to omit it.
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_flags")]
    pub flags: Vec<String>,

    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_program() -> String {
    "node".to_string()
}

fn default_args() -> Vec<String> {
    vec!["worker.cjs".to_string()]
}

fn default_source() -> String {
    "sources.txt".to_string()
}

fn default_flags() -> Vec<String> {
    vec!["--all".to_string()]
}

fn default_marker() -> String {
    crate::progress::DEFAULT_MARKER.to_string()
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            source: default_source(),
            flags: default_flags(),
            marker: default_marker(),
        }
    }
}

impl WorkerSection {
    pub fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            program: self.program.clone(),
            args: self.args.clone(),
            source: (!self.source.is_empty()).then(|| self.source.clone()),
            flags: self.flags.clone(),
        }
    }
}

/// `[publisher]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherSection {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_min_percent_step")]
    pub min_percent_step: u8,

    #[serde(default = "default_min_delivery_gap_ms")]
    pub min_delivery_gap_ms: u64,

    /// How many status codes a snapshot lists.
    #[serde(default = "default_top_codes")]
    pub top_codes: usize,

    /// When set, snapshots are POSTed here; otherwise they are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_min_percent_step() -> u8 {
    5
}

fn default_min_delivery_gap_ms() -> u64 {
    1000
}

fn default_top_codes() -> usize {
    3
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_percent_step: default_min_percent_step(),
            min_delivery_gap_ms: default_min_delivery_gap_ms(),
            top_codes: default_top_codes(),
            webhook_url: None,
        }
    }
}

impl PublisherSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn throttle_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            min_percent_step: self.min_percent_step,
            min_delivery_gap: Duration::from_millis(self.min_delivery_gap_ms),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Delay between consecutive fan-out admissions.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

fn default_stagger_ms() -> u64 {
    2000
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
        }
    }
}

impl SchedulerSection {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

/// `[history]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistorySection {
    /// Optional JSONL file receiving one line per finished job.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

fn default_memory_capacity() -> usize {
    100
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            path: None,
            memory_capacity: default_memory_capacity(),
        }
    }
}

/// `[access]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessSection {
    #[serde(default)]
    pub admins: Vec<String>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "[::]:3000".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
