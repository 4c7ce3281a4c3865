//! Serialized strategy: the lock around the whole transaction.

use crate::*;
use proptest::prelude::*;
use walletrace_engine::{ReleaseSource, ScenarioEvent};

#[test]
fn both_updates_land() {
    let store = seeded_store();
    let report = run(&store, LockPolicy::Serialized);

    assert_eq!(report.final_balance, Some(103.0));
    assert_eq!(store.balance_of(&Alias::default()), Some(103.0));
    assert!(!report.lost_update());
}

#[test]
fn each_read_sees_previous_commit() {
    let report = run(&seeded_store(), LockPolicy::Serialized);

    let reads = report.read_order();
    let commits = report.commit_order();
    assert_eq!(reads, commits);

    let first = report.outcome(reads[0]).unwrap();
    let second = report.outcome(reads[1]).unwrap();
    assert_eq!(first.observed, INITIAL);
    assert_eq!(second.observed, first.computed);
}

#[test]
fn events_alternate_read_then_commit() {
    let report = run(&seeded_store(), LockPolicy::Serialized);

    let kinds: Vec<&str> = report
        .events
        .iter()
        .filter_map(|e| match e.event {
            ScenarioEvent::ReadComplete { .. } => Some("read"),
            ScenarioEvent::Committed { .. } => Some("commit"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["read", "commit", "read", "commit"]);
}

#[test]
fn driver_releases_barrier_once() {
    let report = run(&seeded_store(), LockPolicy::Serialized);

    let releases: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| match e.event {
            ScenarioEvent::Released { source } => Some(source),
            _ => None,
        })
        .collect();
    assert_eq!(releases, vec![ReleaseSource::Driver]);
}

#[test]
fn first_committer_wins_store_sees_no_conflict() {
    let store = seeded_store_with(ConflictPolicy::FirstCommitterWins, INITIAL);
    let report = run(&store, LockPolicy::Serialized);

    assert_eq!(report.final_balance, Some(103.0));
    assert_eq!(store.abort_count(), 0);
}

#[test]
fn repeated_runs_accumulate() {
    let store = seeded_store_with(ConflictPolicy::LastWriterWins, 0.0);
    let scenario = scenario(&store, LockPolicy::Serialized);
    for round in 1..=5 {
        let report = scenario.run().unwrap();
        assert_eq!(report.final_balance, Some(3.0 * round as f64));
    }
}

#[test]
fn fractional_deltas() {
    let store = seeded_store_with(ConflictPolicy::LastWriterWins, 0.5);
    let report = Scenario::<MemoryStore>::builder()
        .deltas([0.25, 0.125])
        .build(store)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(report.final_balance, Some(0.875));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Serialized updates commute: the result is the sum whatever the order.
    #[test]
    fn serialized_result_is_sum_of_deltas(
        initial in -1_000i32..1_000,
        deltas in prop::collection::vec(-50i32..50, 1..6),
    ) {
        let store = seeded_store_with(ConflictPolicy::LastWriterWins, initial as f64);
        let report = Scenario::<MemoryStore>::builder()
            .deltas(deltas.iter().map(|d| *d as f64))
            .policy(LockPolicy::Serialized)
            .build(store.clone())
            .unwrap()
            .run()
            .unwrap();

        let expected = initial as f64 + deltas.iter().map(|d| *d as f64).sum::<f64>();
        prop_assert_eq!(report.final_balance, Some(expected));
        prop_assert_eq!(store.balance_of(&Alias::default()), Some(expected));
        prop_assert!(!report.lost_update());
    }
}
