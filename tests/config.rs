// tests/config.rs

mod common;

use std::fs;
use std::time::Duration;

use chrono::Utc;
use common::ConfigFileBuilder;
use jobvisor::cli::LogLevel;
use jobvisor::config::{ConfigFile, RawConfigFile, load_and_validate, load_from_str, validate_config};
use jobvisor::errors::JobvisorError;
use jobvisor::history::{HistoryEntry, HistorySink, JsonlHistory};
use jobvisor::job::JobOutcome;
use jobvisor::logging::resolve_level;
use jobvisor::types::{JobId, Requester};

fn rejects(toml: &str, needle: &str) {
    let raw = load_from_str(toml).expect("parses");
    match ConfigFile::try_from(raw) {
        Err(JobvisorError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message '{msg}' lacks '{needle}'")
        }
        other => panic!("expected a config error for {toml:?}, got {other:?}"),
    }
}

#[test]
fn empty_file_yields_defaults() {
    let cfg = ConfigFile::try_from(load_from_str("").unwrap()).unwrap();

    let sup = cfg.supervisor_config();
    assert_eq!(sup.max_concurrent, 3);
    assert_eq!(sup.grace, Duration::from_secs(30));
    assert_eq!(sup.kill_grace, Duration::from_secs(5));
    assert_eq!(sup.partial_threshold, 50);
    assert_eq!(sup.publish_interval, Duration::from_secs(3));
    assert_eq!(sup.worker.program, "node");
    assert_eq!(sup.worker.args, vec!["worker.cjs".to_string()]);
    assert_eq!(sup.worker.source.as_deref(), Some("sources.txt"));
    assert_eq!(sup.worker.flags, vec!["--all".to_string()]);

    assert_eq!(cfg.scheduler.stagger(), Duration::from_secs(2));
    assert_eq!(cfg.publisher.top_codes, 3);
    assert!(cfg.publisher.webhook_url.is_none());
    assert!(cfg.history.path.is_none());
    assert!(cfg.access.admins.is_empty());
    assert_eq!(cfg.bind_addr().port(), 3000);
}

#[test]
fn sections_override_defaults() {
    let cfg = ConfigFileBuilder::new()
        .section(
            r#"
            [supervisor]
            max_concurrent = 8
            kill_grace_secs = 2

            [worker]
            program = "/usr/bin/loadgen"
            args = []
            source = ""
            flags = []

            [publisher]
            interval_ms = 500
            webhook_url = "https://hooks.test/progress"

            [access]
            admins = ["root"]

            [server]
            bind = "127.0.0.1:8080"
            "#,
        )
        .build();

    let sup = cfg.supervisor_config();
    assert_eq!(sup.max_concurrent, 8);
    assert_eq!(sup.kill_grace, Duration::from_secs(2));
    assert_eq!(sup.publish_interval, Duration::from_millis(500));
    assert_eq!(sup.worker.source, None);
    assert!(sup.worker.flags.is_empty());
    assert_eq!(cfg.access.admins, vec!["root".to_string()]);
    assert_eq!(cfg.bind_addr().to_string(), "127.0.0.1:8080");
}

#[test]
fn unknown_keys_are_rejected() {
    let err = load_from_str("[supervisor]\nmax_jobs = 4\n").unwrap_err();
    assert!(matches!(err, JobvisorError::TomlError(_)));

    let err = load_from_str("[metrics]\nenabled = true\n").unwrap_err();
    assert!(matches!(err, JobvisorError::TomlError(_)));
}

#[test]
fn invalid_values_are_config_errors() {
    rejects("[supervisor]\nmax_concurrent = 0\n", "max_concurrent");
    rejects("[supervisor]\npartial_threshold = 101\n", "partial_threshold");
    rejects("[supervisor]\nmax_duration_secs = 0\n", "max_duration_secs");
    rejects("[worker]\nprogram = \"  \"\n", "program");
    rejects("[worker]\nmarker = \"\"\n", "marker");
    rejects("[publisher]\ninterval_ms = 0\n", "interval_ms");
    rejects("[publisher]\ntop_codes = 0\n", "top_codes");
    rejects("[publisher]\nmin_percent_step = 120\n", "min_percent_step");
    rejects("[publisher]\nwebhook_url = \"ftp://x\"\n", "webhook_url");
    rejects("[server]\nbind = \"localhost\"\n", "bind");
}

#[test]
fn validate_config_matches_try_from() {
    assert!(validate_config(&RawConfigFile::default()).is_ok());

    let mut raw = RawConfigFile::default();
    raw.supervisor.max_concurrent = 0;
    assert!(validate_config(&raw).is_err());
}

#[test]
fn config_is_loaded_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Jobvisor.toml");
    fs::write(&path, "[scheduler]\nstagger_ms = 250\n").unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.scheduler.stagger(), Duration::from_millis(250));

    let missing = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(missing, JobvisorError::IoError(_)));
}

#[test]
fn cli_level_wins_over_environment() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), tracing::Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warning")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some(" TRACE ")), tracing::Level::TRACE);
    assert_eq!(resolve_level(None, Some("loud")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[tokio::test]
async fn jsonl_history_appends_one_line_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let history = JsonlHistory::new(dir.path().join("history.jsonl"));

    for id in [1u64, 2] {
        let entry = HistoryEntry {
            id: JobId(id),
            target: format!("job{id}.test"),
            duration_secs: 10,
            total_requests: 100,
            success_count: 90,
            fail_count: 10,
            rate: 50,
            threads: 2,
            completed_at: Utc::now(),
            owner: Requester::new("alice"),
            outcome: JobOutcome::Completed,
            extra_args: Vec::new(),
        };
        history.record(&entry).await.unwrap();
    }

    let contents = fs::read_to_string(history.path()).unwrap();
    let entries: Vec<HistoryEntry> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, JobId(1));
    assert_eq!(entries[1].target, "job2.test");
    assert_eq!(entries[1].spec().threads, 2);
    assert!(!contents.contains("extra_args"));
}
