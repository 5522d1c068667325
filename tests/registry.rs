// tests/registry.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use common::JobSpecBuilder;
use jobvisor::job::{JobOutcome, JobRecord, JobRegistry};
use jobvisor::progress::StatusCounts;
use jobvisor::types::{Destination, JobId, Requester};
use proptest::prelude::*;

fn record(id: u64) -> Arc<JobRecord> {
    let owner = Requester::new("alice");
    Arc::new(JobRecord::new(
        JobId(id),
        JobSpecBuilder::new().build(),
        owner.clone(),
        Destination::from(&owner),
    ))
}

#[test]
fn admission_stops_at_cap() {
    let registry = JobRegistry::new();
    assert!(registry.try_admit(2, record(1)));
    assert!(registry.try_admit(2, record(2)));
    assert!(!registry.try_admit(2, record(3)));
    assert_eq!(registry.count(), 2);
    assert!(registry.get(JobId(3)).is_none());
}

#[test]
fn duplicate_id_is_rejected() {
    let registry = JobRegistry::new();
    assert!(registry.try_admit(5, record(7)));
    assert!(!registry.try_admit(5, record(7)));
    assert!(!registry.insert(record(7)));
    assert_eq!(registry.count(), 1);
}

#[test]
fn stopping_jobs_free_their_slot() {
    let registry = JobRegistry::new();
    let first = record(1);
    assert!(registry.try_admit(1, Arc::clone(&first)));
    assert!(!registry.try_admit(1, record(2)));

    assert!(first.request_stop());
    assert!(!first.request_stop());
    assert_eq!(registry.running_count(), 0);
    assert_eq!(registry.count(), 1);
    assert!(registry.try_admit(1, record(2)));
}

#[test]
fn for_each_running_skips_stopping_jobs() {
    let registry = JobRegistry::new();
    for id in 1..=3 {
        assert!(registry.insert(record(id)));
    }
    registry.get(JobId(2)).unwrap().request_stop();

    let mut seen = Vec::new();
    registry.for_each_running(|r| seen.push(r.id()));
    seen.sort();
    assert_eq!(seen, vec![JobId(1), JobId(3)]);
}

#[test]
fn records_are_sorted_by_id() {
    let registry = JobRegistry::new();
    for id in [9, 2, 5] {
        registry.insert(record(id));
    }
    let ids: Vec<JobId> = registry.records().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![JobId(2), JobId(5), JobId(9)]);
}

#[test]
fn counters_are_replaced_not_accumulated() {
    let r = record(1);
    r.apply_counts(StatusCounts::from_pairs([("200", 10), ("500", 1)]));
    r.apply_counts(StatusCounts::from_pairs([("200", 12), ("500", 1)]));
    assert_eq!(r.counters().total(), 13);
    assert_eq!(r.counters().success(), 12);
}

#[test]
fn record_starts_running_with_zero_counters() {
    let r = record(1);
    let state = r.state();
    assert!(state.is_running);
    assert!(!state.stop_requested);
    assert_eq!(state.outcome, None::<JobOutcome>);
    assert_eq!(state.counters.total(), 0);
}

#[test]
fn concurrent_admission_never_exceeds_cap() {
    const CAP: usize = 3;
    let registry = Arc::new(JobRegistry::new());
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16u64)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                if registry.try_admit(CAP, record(i)) {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), CAP);
    assert_eq!(registry.running_count(), CAP);
}

#[derive(Debug, Clone)]
enum Op {
    Admit,
    Stop(usize),
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Admit),
        1 => (0usize..32).prop_map(Op::Stop),
        1 => (0usize..32).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn running_count_never_exceeds_cap(
        cap in 1usize..5,
        ops in proptest::collection::vec(op_strategy(), 1..60),
    ) {
        let registry = JobRegistry::new();
        let mut next_id = 0u64;
        for op in ops {
            match op {
                Op::Admit => {
                    next_id += 1;
                    registry.try_admit(cap, record(next_id));
                }
                Op::Stop(i) => {
                    let records = registry.records();
                    if !records.is_empty() {
                        records[i % records.len()].request_stop();
                    }
                }
                Op::Remove(i) => {
                    let records = registry.records();
                    if !records.is_empty() {
                        registry.remove(records[i % records.len()].id());
                    }
                }
            }
            prop_assert!(registry.running_count() <= cap);
        }
    }
}
