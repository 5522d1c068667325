// src/progress/mod.rs

//! Worker progress grammar.
//!
//! - [`parser`] turns a raw stdout line into [`StatusCounts`].
//! - [`counters`] holds the cumulative per-code totals and derived metrics.

pub mod counters;
pub mod parser;

pub use counters::{StatusCounts, is_success_code};
pub use parser::{DEFAULT_MARKER, StatusLineParser, parse_status_line};
