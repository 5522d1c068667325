use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jobvisor::publish::{DeliveryError, DeliveryFuture, Notice, Snapshot, SnapshotSink};
use jobvisor::types::{Destination, JobId};

/// A [`SnapshotSink`] that records every delivery attempt.
///
/// With [`set_failing`](Self::set_failing) it still records the attempt but
/// reports an error, which lets tests check that delivery failures never
/// block the supervisor. With [`set_delay`](Self::set_delay) every delivery
/// takes that long before it is recorded, like a slow observer.
#[derive(Default)]
pub struct RecordingSink {
    failing: AtomicBool,
    delay: Mutex<Duration>,
    deliveries: Mutex<Vec<(Destination, Notice)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn deliveries(&self) -> Vec<(Destination, Notice)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn progress_for(&self, job: JobId) -> Vec<Snapshot> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, n)| match n {
                Notice::Progress(s) if s.job_id == job => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn finals_for(&self, job: JobId) -> Vec<Snapshot> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, n)| match n {
                Notice::Final(s) if s.job_id == job => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn destinations_for(&self, job: JobId) -> Vec<Destination> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, n)| n.job_id() == Some(job))
            .map(|(d, _)| d.clone())
            .collect()
    }

    pub fn schedule_failures(&self) -> Vec<(Destination, Notice)> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, n)| matches!(n, Notice::ScheduleFailed { .. }))
            .cloned()
            .collect()
    }
}

impl SnapshotSink for RecordingSink {
    fn deliver<'a>(&'a self, destination: &'a Destination, notice: &'a Notice) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.deliveries
                .lock()
                .unwrap()
                .push((destination.clone(), notice.clone()));
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeliveryError::Rejected("sink set to fail".to_string()));
            }
            Ok(())
        })
    }
}
