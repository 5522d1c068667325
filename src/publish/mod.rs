// src/publish/mod.rs

//! Progress publication.
//!
//! The [`ProgressPublisher`] renders a [`JobRecord`] into a [`Snapshot`] and
//! hands it to a [`SnapshotSink`]. Progress snapshots are throttled per job
//! (minimum percent step) and per destination (minimum gap); final
//! snapshots always go out. A failed or slow delivery is logged and
//! dropped: it never fails the job or delays its cleanup beyond
//! [`DELIVERY_TIMEOUT`].

pub mod sink;
pub mod snapshot;
pub mod throttle;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::job::JobRecord;
use crate::types::Destination;

pub use sink::{DeliveryError, DeliveryFuture, LogSink, SnapshotSink, WebhookSink};
pub use snapshot::{CodeCount, Notice, Phase, Snapshot, progress_percent};
pub use throttle::{JobThrottle, ThrottlePolicy, Verdict};

/// Upper bound on a single delivery attempt.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProgressPublisher {
    sink: Arc<dyn SnapshotSink>,
    policy: ThrottlePolicy,
    top_codes: usize,
    last_delivery: Mutex<HashMap<Destination, Instant>>,
}

impl std::fmt::Debug for ProgressPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressPublisher")
            .field("policy", &self.policy)
            .field("top_codes", &self.top_codes)
            .finish_non_exhaustive()
    }
}

impl ProgressPublisher {
    pub fn new(sink: Arc<dyn SnapshotSink>, policy: ThrottlePolicy, top_codes: usize) -> Self {
        Self {
            sink,
            policy,
            top_codes,
            last_delivery: Mutex::new(HashMap::new()),
        }
    }

    pub fn top_codes(&self) -> usize {
        self.top_codes
    }

    /// Current view of a record, unthrottled (for status queries).
    pub fn snapshot(&self, record: &JobRecord) -> Snapshot {
        Snapshot::capture(record, Instant::now(), self.top_codes)
    }

    /// Decide whether a progress snapshot is due and, if so, claim the
    /// destination slot and return it. Delivery is left to the caller.
    pub fn progress_due(&self, record: &JobRecord, throttle: &mut JobThrottle) -> Option<Snapshot> {
        let now = Instant::now();
        let snapshot = Snapshot::capture(record, now, self.top_codes);
        let destination = record.destination();

        // Check and claim the destination slot in one critical section.
        let verdict = {
            let mut last = self
                .last_delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let verdict = self.policy.evaluate(
                throttle.last_percent(),
                snapshot.percent,
                last.get(destination).copied(),
                now,
            );
            if verdict == Verdict::Deliver {
                last.insert(destination.clone(), now);
            }
            verdict
        };

        if verdict != Verdict::Deliver {
            debug!(
                job_id = %record.id(),
                percent = snapshot.percent,
                ?verdict,
                "progress snapshot throttled"
            );
            return None;
        }

        throttle.delivered(snapshot.percent);
        Some(snapshot)
    }

    /// Hand a progress snapshot to the sink.
    pub async fn deliver_progress(&self, destination: &Destination, snapshot: Snapshot) {
        self.send(destination, &Notice::Progress(snapshot)).await;
    }

    /// Deliver the terminal snapshot, bypassing every throttle.
    pub async fn publish_final(&self, record: &JobRecord) {
        let now = Instant::now();
        let snapshot = Snapshot::terminal(record, now, self.top_codes);
        let destination = record.destination();
        self.last_delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(destination.clone(), now);
        self.send(destination, &Notice::Final(snapshot)).await;
    }

    /// Deliver an out-of-band notice (e.g. a failed scheduled admission).
    pub async fn notify(&self, destination: &Destination, notice: Notice) {
        self.send(destination, &notice).await;
    }

    async fn send(&self, destination: &Destination, notice: &Notice) {
        let outcome = tokio::time::timeout(DELIVERY_TIMEOUT, self.sink.deliver(destination, notice))
            .await
            .unwrap_or(Err(DeliveryError::TimedOut(DELIVERY_TIMEOUT)));

        if let Err(err) = outcome {
            warn!(
                destination = %destination,
                job_id = ?notice.job_id(),
                error = %err,
                "snapshot delivery failed; dropping"
            );
        }
    }
}
