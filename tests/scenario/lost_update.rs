//! Unlocked strategy: the lost update.

use crate::*;
use walletrace_core::{ErrorKind, ParticipantId};
use walletrace_engine::{ReleaseSource, ScenarioEvent};

#[test]
fn final_balance_is_initial_plus_one_delta() {
    let store = seeded_store();
    let report = run(&store, LockPolicy::Unlocked);

    let balance = report.final_balance.unwrap();
    assert!(
        balance == INITIAL + 1.0 || balance == INITIAL + 2.0,
        "expected 101 or 102, got {}",
        balance
    );
    assert_eq!(store.balance_of(&Alias::default()), Some(balance));
    assert!(report.lost_update());
    assert_eq!(report.expected_serial_balance(), Some(INITIAL + 3.0));
}

#[test]
fn both_reads_observe_initial_balance() {
    let report = run(&seeded_store(), LockPolicy::Unlocked);

    assert_eq!(report.outcomes.len(), 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.observed, INITIAL);
        assert_eq!(outcome.computed, INITIAL + outcome.delta);
    }
    // The last committer's write is the one that survived
    let last = *report.commit_order().last().unwrap();
    assert_eq!(
        report.final_balance,
        report.outcome(last).map(|o| o.computed)
    );
}

#[test]
fn reads_precede_writes_and_barrier_fills_itself() {
    let report = run(&seeded_store(), LockPolicy::Unlocked);

    assert!(report.reads_before_writes());
    assert_eq!(report.read_order().len(), 2);
    assert_eq!(report.commit_order().len(), 2);
    assert!(matches!(
        report.release_source(),
        Some(ReleaseSource::Quota(_))
    ));
    assert!(!report
        .events
        .iter()
        .any(|e| matches!(e.event, ScenarioEvent::Released { source: ReleaseSource::Driver })));
}

#[test]
fn quota_release_is_logged_before_any_commit() {
    for _ in 0..50 {
        let report = run(&seeded_store(), LockPolicy::Unlocked);
        let position = |wanted: fn(&ScenarioEvent) -> bool| {
            report.events.iter().position(|e| wanted(&e.event))
        };

        let released = position(|e| matches!(e, ScenarioEvent::Released { .. })).unwrap();
        let first_commit = position(|e| matches!(e, ScenarioEvent::Committed { .. })).unwrap();
        assert!(
            released < first_commit,
            "release at {} after commit at {}",
            released,
            first_commit
        );
    }
}

#[test]
fn race_reproduces_every_run() {
    for _ in 0..20 {
        let report = run(&seeded_store(), LockPolicy::Unlocked);
        assert!(report.lost_update());
    }
}

#[test]
fn more_participants_keep_only_one_update() {
    let store = seeded_store();
    let report = Scenario::<MemoryStore>::builder()
        .policy(LockPolicy::Unlocked)
        .deltas([1.0, 2.0, 4.0, 8.0])
        .build(store.clone())
        .unwrap()
        .run()
        .unwrap();

    let balance = report.final_balance.unwrap();
    assert!(
        [101.0, 102.0, 104.0, 108.0].contains(&balance),
        "got {}",
        balance
    );
    assert!(report.outcomes.iter().all(|o| o.observed == INITIAL));
    assert!(report.reads_before_writes());
}

#[test]
fn first_committer_wins_store_aborts_the_loser() {
    let store = seeded_store_with(ConflictPolicy::FirstCommitterWins, INITIAL);
    let err = scenario(&store, LockPolicy::Unlocked).run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AbortedByConflict);
    assert!(err.is_conflict());
    let balance = store.balance_of(&Alias::default()).unwrap();
    assert!(balance == 101.0 || balance == 102.0, "got {}", balance);
    assert_eq!(store.abort_count(), 1);
}

#[test]
fn participant_ids_follow_delta_order() {
    let report = run(&seeded_store(), LockPolicy::Unlocked);
    assert_eq!(report.outcomes[0].participant, ParticipantId(0));
    assert_eq!(report.outcomes[0].delta, 1.0);
    assert_eq!(report.outcomes[1].participant, ParticipantId(1));
    assert_eq!(report.outcomes[1].delta, 2.0);
}
