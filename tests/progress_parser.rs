// tests/progress_parser.rs

use jobvisor::progress::{StatusCounts, StatusLineParser, is_success_code, parse_status_line};
use proptest::prelude::*;

#[test]
fn parses_mixed_codes() {
    let counts = parse_status_line("Status: [200: 50, 404: 10, 500: 2]").unwrap();
    assert_eq!(counts.total(), 62);
    assert_eq!(counts.success(), 50);
    assert_eq!(counts.fail(), 12);
    assert_eq!(counts.get("404"), 10);
}

#[test]
fn tolerates_whitespace_and_surrounding_text() {
    let counts = parse_status_line("[worker 3] Status:[ 200 :7 ,301: 3 ] tail").unwrap();
    assert_eq!(counts.total(), 10);
    assert_eq!(counts.success(), 7);
    assert_eq!(counts.get("301"), 3);
}

#[test]
fn non_numeric_codes_count_as_failures() {
    let counts = parse_status_line("Status: [200: 5, ECONNRESET: 4, TIMEOUT: 1]").unwrap();
    assert_eq!(counts.total(), 10);
    assert_eq!(counts.success(), 5);
    assert_eq!(counts.fail(), 5);
}

#[test]
fn lines_without_summary_are_ignored() {
    assert!(parse_status_line("starting 4 threads").is_none());
    assert!(parse_status_line("Status: pending").is_none());
    assert!(parse_status_line("").is_none());
}

#[test]
fn empty_or_malformed_brackets_give_no_update() {
    assert!(parse_status_line("Status: []").is_none());
    assert!(parse_status_line("Status: [ok, 200: many]").is_none());
}

#[test]
fn malformed_pairs_are_skipped() {
    let counts = parse_status_line("Status: [200: 3, garbage, 500: x, 503: 1]").unwrap();
    assert_eq!(counts.total(), 4);
    assert_eq!(counts.success(), 3);
    assert_eq!(counts.codes().len(), 2);
}

#[test]
fn repeated_code_keeps_last_value() {
    let counts = parse_status_line("Status: [200: 1, 404: 2, 200: 9]").unwrap();
    assert_eq!(counts.get("200"), 9);
    assert_eq!(counts.total(), 11);
    let order: Vec<&str> = counts.codes().keys().map(String::as_str).collect();
    assert_eq!(order, vec!["200", "404"]);
}

#[test]
fn custom_marker_is_matched_literally() {
    let parser = StatusLineParser::new("progress(*)").unwrap();
    assert_eq!(parser.marker(), "progress(*)");
    let counts = parser.parse("progress(*) [204: 2]").unwrap();
    assert_eq!(counts.success(), 2);
    assert!(parser.parse("Status: [200: 1]").is_none());
}

#[test]
fn success_rate_rounds_half_up() {
    assert_eq!(StatusCounts::default().success_rate(), 0);
    assert_eq!(StatusCounts::from_pairs([("200", 20), ("500", 4)]).success_rate(), 83);
    assert_eq!(StatusCounts::from_pairs([("200", 1), ("500", 1)]).success_rate(), 50);
    assert_eq!(StatusCounts::from_pairs([("200", 1), ("500", 7)]).success_rate(), 13);
    assert_eq!(StatusCounts::from_pairs([("500", 3)]).success_rate(), 0);
}

#[test]
fn top_codes_break_ties_by_first_appearance() {
    let counts = StatusCounts::from_pairs([("503", 5), ("200", 9), ("404", 5), ("500", 1)]);
    let top = counts.top_codes(3);
    assert_eq!(
        top,
        vec![
            ("200".to_string(), 9),
            ("503".to_string(), 5),
            ("404".to_string(), 5)
        ]
    );
    assert!(counts.top_codes(0).is_empty());
    assert_eq!(counts.top_codes(10).len(), 4);
}

#[test]
fn success_codes_are_numeric_2xx() {
    assert!(is_success_code("200"));
    assert!(is_success_code("299"));
    assert!(!is_success_code("199"));
    assert!(!is_success_code("300"));
    assert!(!is_success_code("2xx"));
    assert!(!is_success_code(""));
}

fn pairs_strategy() -> impl Strategy<Value = Vec<(u16, u32)>> {
    proptest::collection::vec((100u16..600, 0u32..100_000), 1..8)
}

fn render(pairs: &[(u16, u32)]) -> String {
    let body = pairs
        .iter()
        .map(|(c, n)| format!("{c}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Status: [{body}]")
}

proptest! {
    #[test]
    fn parsing_is_idempotent(pairs in pairs_strategy()) {
        let line = render(&pairs);
        let first = parse_status_line(&line);
        let second = parse_status_line(&line);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn totals_are_consistent(pairs in pairs_strategy()) {
        let counts = parse_status_line(&render(&pairs)).unwrap();
        let sum: u64 = counts.codes().values().sum();
        prop_assert_eq!(counts.total(), sum);
        prop_assert!(counts.success() <= counts.total());
        prop_assert_eq!(counts.success() + counts.fail(), counts.total());
        prop_assert!(counts.success_rate() <= 100);
    }

    #[test]
    fn growing_counts_never_shrink_totals(
        pairs in pairs_strategy(),
        bumps in proptest::collection::vec(0u32..1000, 8),
    ) {
        let before = parse_status_line(&render(&pairs)).unwrap();
        let grown: Vec<(u16, u32)> = pairs
            .iter()
            .zip(bumps.iter())
            .map(|((c, n), b)| (*c, n + b))
            .collect();
        let after = parse_status_line(&render(&grown)).unwrap();
        prop_assert!(after.total() >= before.total());
        prop_assert!(after.success() >= before.success());
    }
}
