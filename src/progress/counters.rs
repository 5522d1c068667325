// src/progress/counters.rs

use indexmap::IndexMap;
use serde::Serialize;

/// Cumulative per-code counters reported by a worker.
///
/// Codes keep the order in which they appear in the worker's status line,
/// which is what [`StatusCounts::top_codes`] uses to break ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    codes: IndexMap<String, u64>,
    total: u64,
    success: u64,
}

impl StatusCounts {
    /// Build counters from `(code, count)` pairs.
    ///
    /// A code repeated within one batch keeps its first position and its
    /// last value.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut codes = IndexMap::new();
        for (code, count) in pairs {
            codes.insert(code.into(), count);
        }

        let mut total = 0u64;
        let mut success = 0u64;
        for (code, count) in &codes {
            total = total.saturating_add(*count);
            if is_success_code(code) {
                success = success.saturating_add(*count);
            }
        }

        Self {
            codes,
            total,
            success,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn success(&self) -> u64 {
        self.success
    }

    pub fn fail(&self) -> u64 {
        self.total - self.success
    }

    pub fn codes(&self) -> &IndexMap<String, u64> {
        &self.codes
    }

    pub fn get(&self, code: &str) -> u64 {
        self.codes.get(code).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Success share in whole percent, rounded half up; 0 when nothing was
    /// observed.
    pub fn success_rate(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let total = u128::from(self.total);
        let pct = (u128::from(self.success) * 100 + total / 2) / total;
        pct.min(100) as u8
    }

    /// The `n` largest codes by count, descending. Equal counts keep the
    /// order the codes were first reported in.
    pub fn top_codes(&self, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .codes
            .iter()
            .map(|(code, count)| (code.clone(), *count))
            .collect();
        // `sort_by` is stable, so insertion order survives for ties.
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }
}

/// Whether a worker-reported code counts as a success (numeric 2xx).
pub fn is_success_code(code: &str) -> bool {
    code.parse::<u16>()
        .is_ok_and(|c| (200..300).contains(&c))
}
