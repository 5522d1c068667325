#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use jobvisor::config::{ConfigFile, RawConfigFile, load_from_str};
use jobvisor::history::{HistorySink, MemoryHistory};
use jobvisor::job::JobSpec;
use jobvisor::progress::StatusLineParser;
use jobvisor::publish::{ProgressPublisher, ThrottlePolicy};
use jobvisor::service::JobService;
use jobvisor::supervisor::{AdminList, ProcessSupervisor, SupervisorConfig};
use jobvisor::worker::WorkerSettings;

use crate::fake_worker::ScriptedLauncher;
use crate::recording_sink::RecordingSink;

/// Builder for `JobSpec` with small, valid defaults.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: JobSpec::new("service.test", 10, 100, 4),
        }
    }

    pub fn target(mut self, target: &str) -> Self {
        self.spec.target = target.to_string();
        self
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.spec.duration_secs = secs;
        self
    }

    pub fn rate(mut self, rate: u32) -> Self {
        self.spec.rate = rate;
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.spec.threads = threads;
        self
    }

    pub fn extra_arg(mut self, arg: &str) -> Self {
        self.spec.extra_args.push(arg.to_string());
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

impl Default for JobSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `SupervisorConfig`. Defaults match the shipped config
/// except for the worker program, which is a placeholder since tests use
/// a scripted launcher or override it.
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SupervisorConfig {
                max_concurrent: 3,
                grace: Duration::from_secs(30),
                kill_grace: Duration::from_secs(5),
                partial_threshold: 50,
                max_duration_secs: 3600,
                publish_interval: Duration::from_secs(3),
                worker: WorkerSettings {
                    program: "fake-worker".to_string(),
                    args: vec!["worker.cjs".to_string()],
                    source: Some("sources.txt".to_string()),
                    flags: vec!["--all".to_string()],
                },
            },
        }
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.config.grace = grace;
        self
    }

    pub fn kill_grace(mut self, kill_grace: Duration) -> Self {
        self.config.kill_grace = kill_grace;
        self
    }

    pub fn partial_threshold(mut self, threshold: u8) -> Self {
        self.config.partial_threshold = threshold;
        self
    }

    pub fn publish_interval(mut self, interval: Duration) -> Self {
        self.config.publish_interval = interval;
        self
    }

    pub fn worker(mut self, program: &str, args: &[&str]) -> Self {
        self.config.worker = WorkerSettings {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            source: None,
            flags: Vec::new(),
        };
        self
    }

    pub fn build(self) -> SupervisorConfig {
        self.config
    }
}

impl Default for SupervisorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a validated `ConfigFile` from TOML snippets.
pub struct ConfigFileBuilder {
    toml: String,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            toml: String::new(),
        }
    }

    pub fn section(mut self, toml: &str) -> Self {
        self.toml.push_str(toml);
        self.toml.push('\n');
        self
    }

    pub fn raw(&self) -> RawConfigFile {
        load_from_str(&self.toml).expect("invalid TOML in ConfigFileBuilder")
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.raw()).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A supervisor wired to a scripted launcher and a recording sink.
pub struct Harness {
    pub supervisor: Arc<ProcessSupervisor>,
    pub launcher: Arc<ScriptedLauncher>,
    pub sink: Arc<RecordingSink>,
    pub history: Arc<MemoryHistory>,
}

impl Harness {
    /// Wrap the supervisor in a `JobService`.
    pub fn service(&self, stagger: Duration) -> Arc<JobService> {
        Arc::new(JobService::new(
            Arc::clone(&self.supervisor),
            Arc::clone(&self.history),
            stagger,
        ))
    }
}

pub struct HarnessBuilder {
    config: SupervisorConfig,
    launcher: Option<ScriptedLauncher>,
    admins: Vec<String>,
    policy: ThrottlePolicy,
    top_codes: usize,
    history_sinks: Vec<Arc<dyn HistorySink>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: SupervisorConfigBuilder::new().build(),
            launcher: None,
            admins: Vec::new(),
            policy: ThrottlePolicy::default(),
            top_codes: 3,
            history_sinks: Vec::new(),
        }
    }

    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn launcher(mut self, launcher: ScriptedLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn admin(mut self, admin: &str) -> Self {
        self.admins.push(admin.to_string());
        self
    }

    pub fn throttle(mut self, policy: ThrottlePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register an extra history sink after the in-memory one.
    pub fn history_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history_sinks.push(sink);
        self
    }

    pub fn build(self) -> Harness {
        let launcher = Arc::new(self.launcher.unwrap_or_default());
        let sink = Arc::new(RecordingSink::new());
        let history = Arc::new(MemoryHistory::new(100));
        let publisher = Arc::new(ProgressPublisher::new(
            sink.clone(),
            self.policy,
            self.top_codes,
        ));
        let mut supervisor = ProcessSupervisor::new(
            self.config,
            StatusLineParser::default(),
            launcher.clone(),
            publisher,
            Arc::new(AdminList::new(self.admins)),
        )
        .with_history(history.clone());
        for sink in self.history_sinks {
            supervisor = supervisor.with_history(sink);
        }

        Harness {
            supervisor: Arc::new(supervisor),
            launcher,
            sink,
            history,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
