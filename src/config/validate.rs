// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobvisorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JobvisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let bind = parse_bind(&raw.server.bind)?;
        Ok(ConfigFile::new_unchecked(raw, bind))
    }
}

/// Check every invariant `ConfigFile` promises, without building one.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)?;
    parse_bind(&cfg.server.bind)?;
    Ok(())
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_supervisor(cfg)?;
    validate_worker(cfg)?;
    validate_publisher(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> JobvisorError {
    JobvisorError::ConfigError(msg.into())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.supervisor;
    if s.max_concurrent == 0 {
        return Err(config_error(
            "[supervisor].max_concurrent must be >= 1 (got 0)",
        ));
    }
    if s.partial_threshold > 100 {
        return Err(config_error(format!(
            "[supervisor].partial_threshold must be a percentage (got {})",
            s.partial_threshold
        )));
    }
    if s.max_duration_secs == 0 {
        return Err(config_error(
            "[supervisor].max_duration_secs must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_worker(cfg: &RawConfigFile) -> Result<()> {
    let w = &cfg.worker;
    if w.program.trim().is_empty() {
        return Err(config_error("[worker].program must not be empty"));
    }
    if w.marker.is_empty() {
        return Err(config_error("[worker].marker must not be empty"));
    }
    Ok(())
}

fn validate_publisher(cfg: &RawConfigFile) -> Result<()> {
    let p = &cfg.publisher;
    if p.interval_ms == 0 {
        return Err(config_error("[publisher].interval_ms must be >= 1 (got 0)"));
    }
    if p.top_codes == 0 {
        return Err(config_error("[publisher].top_codes must be >= 1 (got 0)"));
    }
    if p.min_percent_step > 100 {
        return Err(config_error(format!(
            "[publisher].min_percent_step must be a percentage (got {})",
            p.min_percent_step
        )));
    }
    if let Some(ref url) = p.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(config_error(format!(
                "[publisher].webhook_url must be an http(s) URL (got '{url}')"
            )));
        }
    }
    Ok(())
}

fn parse_bind(bind: &str) -> Result<SocketAddr> {
    bind.parse()
        .map_err(|e| config_error(format!("[server].bind '{bind}' is not a socket address: {e}")))
}
