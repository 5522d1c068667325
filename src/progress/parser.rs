// src/progress/parser.rs

use std::sync::LazyLock;

use regex::Regex;

use super::counters::StatusCounts;

/// Marker workers print in front of their status summary.
pub const DEFAULT_MARKER: &str = "Status:";

static DEFAULT_PARSER: LazyLock<StatusLineParser> = LazyLock::new(|| {
    StatusLineParser::new(DEFAULT_MARKER).expect("escaped default marker is a valid pattern")
});

/// Parse a worker output line using the default `Status:` marker.
///
/// `"Status: [200: 50, 404: 10, 500: 2]"` yields totals of 62/50/12.
pub fn parse_status_line(line: &str) -> Option<StatusCounts> {
    DEFAULT_PARSER.parse(line)
}

/// Recognises `<marker> [<code>: <count>, ...]` inside a line of worker
/// output.
///
/// The worker prints cumulative totals, so each parsed line is a complete
/// replacement for the previous counters, never a delta.
#[derive(Debug, Clone)]
pub struct StatusLineParser {
    marker: String,
    pattern: Regex,
}

impl StatusLineParser {
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"{}\s*\[([^\]]*)\]", regex::escape(marker)))?;
        Ok(Self {
            marker: marker.to_string(),
            pattern,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Returns `None` when the line carries no status summary, or when every
    /// pair inside the brackets is malformed.
    pub fn parse(&self, line: &str) -> Option<StatusCounts> {
        let caps = self.pattern.captures(line)?;
        let body = caps.get(1)?.as_str();

        let counts = StatusCounts::from_pairs(body.split(',').filter_map(parse_pair));
        if counts.is_empty() {
            None
        } else {
            Some(counts)
        }
    }
}

impl Default for StatusLineParser {
    fn default() -> Self {
        DEFAULT_PARSER.clone()
    }
}

/// `" 404: 10"` -> `("404", 10)`. Anything else is skipped.
fn parse_pair(raw: &str) -> Option<(&str, u64)> {
    let (code, count) = raw.split_once(':')?;
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let count = count.trim().parse::<u64>().ok()?;
    Some((code, count))
}
