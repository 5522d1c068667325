// src/job/registry.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::job::JobRecord;
use crate::types::JobId;

/// Concurrency-safe map of admitted jobs.
///
/// The map lock is only held for the duration of a lookup or insertion;
/// nothing awaits while holding it, and per-record counter updates never
/// touch it.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Arc<JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobRecord>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `record` if fewer than `max_concurrent` jobs are running.
    ///
    /// The running count and the insertion happen under the same lock, so
    /// concurrent callers can never push the number of running jobs past the
    /// cap. Returns `false` with no side effects when at the cap or when the
    /// id is already taken.
    pub fn try_admit(&self, max_concurrent: usize, record: Arc<JobRecord>) -> bool {
        let mut jobs = self.lock();
        let running = jobs.values().filter(|r| r.is_running()).count();
        if running >= max_concurrent {
            debug!(running, max_concurrent, "admission rejected: at capacity");
            return false;
        }
        if jobs.contains_key(&record.id()) {
            return false;
        }
        jobs.insert(record.id(), record);
        true
    }

    /// Insert without a capacity check. Returns `false` if the id exists.
    pub fn insert(&self, record: Arc<JobRecord>) -> bool {
        let mut jobs = self.lock();
        if jobs.contains_key(&record.id()) {
            return false;
        }
        jobs.insert(record.id(), record);
        true
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.lock().remove(&id)
    }

    /// Call `f` for every running record.
    ///
    /// `f` runs after the map lock is released, so it may call back into the
    /// registry.
    pub fn for_each_running<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<JobRecord>),
    {
        let running: Vec<Arc<JobRecord>> = self
            .lock()
            .values()
            .filter(|r| r.is_running())
            .cloned()
            .collect();
        for record in &running {
            f(record);
        }
    }

    /// All admitted records ordered by id.
    pub fn records(&self) -> Vec<Arc<JobRecord>> {
        let mut records: Vec<Arc<JobRecord>> = self.lock().values().cloned().collect();
        records.sort_by_key(|r| r.id());
        records
    }

    /// Number of admitted records, running or finishing.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn running_count(&self) -> usize {
        self.lock().values().filter(|r| r.is_running()).count()
    }
}
