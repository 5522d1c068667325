// tests/throttle.rs

use std::time::Duration;

use jobvisor::publish::{ThrottlePolicy, Verdict, progress_percent};
use tokio::time::Instant;

fn policy() -> ThrottlePolicy {
    ThrottlePolicy {
        min_percent_step: 5,
        min_delivery_gap: Duration::from_secs(1),
    }
}

#[test]
fn percent_is_floored_and_capped() {
    assert_eq!(progress_percent(Duration::ZERO, 10), 0);
    assert_eq!(progress_percent(Duration::from_secs(3), 10), 30);
    assert_eq!(progress_percent(Duration::from_millis(3999), 10), 30);
    assert_eq!(progress_percent(Duration::from_secs(1), 3), 33);
    assert_eq!(progress_percent(Duration::from_secs(45), 30), 100);
    assert_eq!(progress_percent(Duration::from_secs(5), 0), 100);
}

#[test]
fn first_snapshot_is_delivered() {
    let now = Instant::now();
    assert_eq!(policy().evaluate(None, 0, None, now), Verdict::Deliver);
}

#[test]
fn small_steps_are_skipped() {
    let now = Instant::now();
    let p = policy();
    assert_eq!(p.evaluate(Some(30), 33, None, now), Verdict::SkipPercent);
    assert_eq!(p.evaluate(Some(30), 35, None, now), Verdict::Deliver);
}

#[test]
fn no_repeat_or_regression() {
    let now = Instant::now();
    let p = policy();
    assert_eq!(p.evaluate(Some(60), 60, None, now), Verdict::SkipPercent);
    assert_eq!(p.evaluate(Some(60), 40, None, now), Verdict::SkipPercent);
    assert_eq!(p.evaluate(Some(100), 100, None, now), Verdict::SkipPercent);
}

#[test]
fn reaching_completion_bypasses_step() {
    let now = Instant::now();
    assert_eq!(policy().evaluate(Some(98), 100, None, now), Verdict::Deliver);
}

#[test]
fn destination_gap_applies_to_every_progress_snapshot() {
    let start = Instant::now();
    let p = policy();
    let soon = start + Duration::from_millis(400);
    let later = start + Duration::from_millis(1000);

    assert_eq!(p.evaluate(Some(10), 50, Some(start), soon), Verdict::SkipGap);
    assert_eq!(p.evaluate(Some(98), 100, Some(start), soon), Verdict::SkipGap);
    assert_eq!(p.evaluate(Some(10), 50, Some(start), later), Verdict::Deliver);
}
