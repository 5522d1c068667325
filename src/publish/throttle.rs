// src/publish/throttle.rs

//! Delivery throttling, kept free of IO so the rules can be tested with
//! literal values.

use std::time::Duration;

use tokio::time::Instant;

/// Decision for one candidate progress delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    /// Percent moved less than the minimum step (or not at all).
    SkipPercent,
    /// The destination received something too recently.
    SkipGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub min_percent_step: u8,
    pub min_delivery_gap: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            min_percent_step: 5,
            min_delivery_gap: Duration::from_secs(1),
        }
    }
}

impl ThrottlePolicy {
    /// Decide whether a progress snapshot at `percent` should go out.
    ///
    /// - The first snapshot of a job always passes the percent check.
    /// - A percent that does not exceed the last delivered one is dropped,
    ///   so observers never see progress go backwards or repeat.
    /// - Reaching 100% bypasses the minimum step.
    /// - The per-destination gap applies regardless of percent.
    pub fn evaluate(
        &self,
        last_percent: Option<u8>,
        percent: u8,
        last_delivery: Option<Instant>,
        now: Instant,
    ) -> Verdict {
        if let Some(last) = last_percent {
            if percent <= last {
                return Verdict::SkipPercent;
            }
            if percent < 100 && percent - last < self.min_percent_step {
                return Verdict::SkipPercent;
            }
        }

        if let Some(at) = last_delivery {
            if now.saturating_duration_since(at) < self.min_delivery_gap {
                return Verdict::SkipGap;
            }
        }

        Verdict::Deliver
    }
}

/// Per-job memory of what was last delivered.
#[derive(Debug, Default, Clone)]
pub struct JobThrottle {
    last_percent: Option<u8>,
}

impl JobThrottle {
    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }

    pub(crate) fn delivered(&mut self, percent: u8) {
        self.last_percent = Some(self.last_percent.map_or(percent, |p| p.max(percent)));
    }
}
