// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod history;
pub mod http;
pub mod job;
pub mod logging;
pub mod progress;
pub mod publish;
pub mod scheduler;
pub mod service;
pub mod supervisor;
pub mod types;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, RawConfigFile, default_config_path, load_from_path};
use crate::publish::{DELIVERY_TIMEOUT, LogSink, SnapshotSink, WebhookSink};
use crate::service::JobService;
use crate::worker::CommandLauncher;

/// Extra time granted on shutdown on top of the kill grace, for stdout
/// draining, history writes and final deliveries.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(15);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the observer sink (webhook or log)
/// - the supervisor, scheduler and service
/// - the HTTP server
/// - Ctrl-C handling and a bounded drain of running jobs
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let sink: Arc<dyn SnapshotSink> = match cfg.publisher.webhook_url {
        Some(ref url) => Arc::new(
            WebhookSink::new(url.clone(), DELIVERY_TIMEOUT)
                .context("failed to build webhook client")?,
        ),
        None => Arc::new(LogSink),
    };

    let service = Arc::new(JobService::from_config(
        &cfg,
        Arc::new(CommandLauncher::new()),
        sink,
    )?);

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, program = %cfg.worker.program, "jobvisor listening");

    axum::serve(listener, http::router(Arc::clone(&service)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let timeout = Duration::from_secs(cfg.supervisor.kill_grace_secs) + SHUTDOWN_SLACK;
    let left = service.shutdown(timeout).await;
    if left > 0 {
        warn!(jobs = left, "exiting with jobs still registered");
    } else {
        info!("shutdown complete");
    }
    Ok(())
}

/// Explicit `--config` must exist; the default path is optional.
fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = match args.config {
        Some(ref path) => {
            load_from_path(path).with_context(|| format!("failed to load config '{path}'"))?
        }
        None => {
            let path = default_config_path();
            if path.exists() {
                load_from_path(&path)
                    .with_context(|| format!("failed to load config '{}'", path.display()))?
            } else {
                RawConfigFile::default()
            }
        }
    };

    if let Some(ref bind) = args.bind {
        raw.server.bind = bind.clone();
    }

    Ok(ConfigFile::try_from(raw)?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn print_dry_run(cfg: &ConfigFile) {
    let s = &cfg.supervisor;
    let w = &cfg.worker;
    let p = &cfg.publisher;

    println!("jobvisor dry-run");
    println!("  supervisor.max_concurrent = {}", s.max_concurrent);
    println!("  supervisor.grace_secs = {}", s.grace_secs);
    println!("  supervisor.kill_grace_secs = {}", s.kill_grace_secs);
    println!("  supervisor.partial_threshold = {}", s.partial_threshold);
    println!("  supervisor.max_duration_secs = {}", s.max_duration_secs);
    println!();
    println!("worker:");
    println!("  program: {}", w.program);
    if !w.args.is_empty() {
        println!("  args: {:?}", w.args);
    }
    if !w.source.is_empty() {
        println!("  source: {}", w.source);
    }
    if !w.flags.is_empty() {
        println!("  flags: {:?}", w.flags);
    }
    println!("  marker: {}", w.marker);
    println!();
    println!("publisher:");
    println!("  interval_ms: {}", p.interval_ms);
    println!("  min_percent_step: {}", p.min_percent_step);
    println!("  min_delivery_gap_ms: {}", p.min_delivery_gap_ms);
    println!("  top_codes: {}", p.top_codes);
    match p.webhook_url {
        Some(ref url) => println!("  sink: webhook {url}"),
        None => println!("  sink: log"),
    }
    println!();
    println!("scheduler.stagger_ms = {}", cfg.scheduler.stagger_ms);
    if let Some(ref path) = cfg.history.path {
        println!("history.path = {}", path.display());
    }
    println!("history.memory_capacity = {}", cfg.history.memory_capacity);
    println!("access.admins = {:?}", cfg.access.admins);
    println!("server.bind = {}", cfg.bind_addr());
}
