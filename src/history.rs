// src/history.rs

//! Completed-job history.
//!
//! The supervisor writes one [`HistoryEntry`] per finished job to every
//! configured [`HistorySink`]. A sink failure is logged and otherwise
//! ignored.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::job::{JobOutcome, JobSpec};
use crate::types::{JobId, Requester};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: JobId,
    pub target: String,
    pub duration_secs: u64,
    pub total_requests: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub rate: u32,
    pub threads: u32,
    pub completed_at: DateTime<Utc>,
    pub owner: Requester,
    pub outcome: JobOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl HistoryEntry {
    /// Parameters needed to run the same job again.
    pub fn spec(&self) -> JobSpec {
        JobSpec {
            target: self.target.clone(),
            duration_secs: self.duration_secs,
            rate: self.rate,
            threads: self.threads,
            extra_args: self.extra_args.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type HistoryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HistoryError>> + Send + 'a>>;

pub trait HistorySink: Send + Sync {
    fn record<'a>(&'a self, entry: &'a HistoryEntry) -> HistoryFuture<'a>;
}

/// Bounded in-memory ring of the most recent entries.
#[derive(Debug)]
pub struct MemoryHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: HistoryEntry) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn find(&self, id: JobId) -> Option<HistoryEntry> {
        self.lock().iter().rev().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sum of `total_requests` over the retained entries.
    pub fn total_requests(&self) -> u64 {
        self.lock()
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.total_requests))
    }
}

impl HistorySink for MemoryHistory {
    fn record<'a>(&'a self, entry: &'a HistoryEntry) -> HistoryFuture<'a> {
        Box::pin(async move {
            self.push(entry.clone());
            Ok(())
        })
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    // Serialises appends so concurrent finishers don't interleave lines.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistorySink for JsonlHistory {
    fn record<'a>(&'a self, entry: &'a HistoryEntry) -> HistoryFuture<'a> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(entry)?;
            line.push(b'\n');

            let _guard = self.write_lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(&line).await?;
            file.flush().await?;
            Ok(())
        })
    }
}
