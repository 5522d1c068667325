// src/publish/sink.rs

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::snapshot::Notice;
use crate::types::Destination;

/// Why a notice did not reach its observer. Always logged, never retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("observer rejected delivery: {0}")]
    Rejected(String),

    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Where notices go.
pub trait SnapshotSink: Send + Sync {
    fn deliver<'a>(&'a self, destination: &'a Destination, notice: &'a Notice) -> DeliveryFuture<'a>;
}

/// Writes notices to the log. Used when no observer endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn deliver<'a>(&'a self, destination: &'a Destination, notice: &'a Notice) -> DeliveryFuture<'a> {
        Box::pin(async move {
            match notice {
                Notice::Progress(s) | Notice::Final(s) => info!(
                    destination = %destination,
                    job_id = %s.job_id,
                    phase = ?s.phase,
                    outcome = ?s.outcome,
                    percent = s.percent,
                    total = s.total,
                    success = s.success,
                    fail = s.fail,
                    success_rate = s.success_rate,
                    "job snapshot"
                ),
                Notice::ScheduleFailed {
                    schedule_id,
                    target,
                    reason,
                } => info!(
                    destination = %destination,
                    schedule_id = %schedule_id,
                    target = %target,
                    reason = %reason,
                    "scheduled job could not be admitted"
                ),
            }
            Ok(())
        })
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    destination: &'a Destination,
    notice: &'a Notice,
}

/// POSTs every notice as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl SnapshotSink for WebhookSink {
    fn deliver<'a>(&'a self, destination: &'a Destination, notice: &'a Notice) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&WebhookBody {
                    destination,
                    notice,
                })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::Rejected(format!("HTTP {status}")));
            }
            Ok(())
        })
    }
}
