//! Failure handling: discard, propagation, no deadlock.

use crate::*;
use walletrace_core::{ErrorKind, ParticipantId};
use walletrace_engine::BalanceAccessor;
use walletrace_storage::{Fault, FaultSpec};

const POLICIES: [LockPolicy; 2] = [LockPolicy::Unlocked, LockPolicy::Serialized];

#[test]
fn discarded_write_leaves_balance_unchanged() {
    let store = seeded_store();
    let accessor = BalanceAccessor::new(Alias::default());
    let conn = store.connect().unwrap();

    let mut txn = conn.begin().unwrap();
    let before = accessor.read_balance(&mut txn).unwrap();
    accessor.write_balance(&mut txn, before + 50.0).unwrap();
    txn.discard().unwrap();

    let mut txn = conn.begin().unwrap();
    assert_eq!(accessor.read_balance(&mut txn).unwrap(), before);
    txn.discard().unwrap();
    conn.close().unwrap();
}

#[test]
fn missing_record_is_not_found_under_both_policies() {
    for policy in POLICIES {
        let store = MemoryStore::new();
        let err = scenario(&store, policy).run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "policy {}", policy);
        assert_eq!(store.count_alias(&Alias::default()), 0);
    }
}

#[test]
fn duplicate_alias_is_parse_failure() {
    let store = seeded_store();
    add_duplicate_record(&store, 5.0);
    assert_eq!(store.count_alias(&Alias::default()), 2);

    let err = scenario(&store, LockPolicy::Serialized).run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn failed_read_does_not_deadlock_peer() {
    for policy in POLICIES {
        let store = seeded_store();
        store.inject(FaultSpec::once(Fault::Query));

        let err = scenario(&store, policy).run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query, "policy {}", policy);
        assert!(err.to_string().contains("failed"));
    }
}

#[test]
fn failed_read_under_unlocked_leaves_balance() {
    let store = seeded_store();
    store.inject(FaultSpec::once(Fault::Query));
    scenario(&store, LockPolicy::Unlocked).run().unwrap_err();

    // The peer was either stopped at the barrier or never read
    assert_eq!(store.balance_of(&Alias::default()), Some(INITIAL));
}

#[test]
fn failed_commit_is_fatal_but_peer_may_commit() {
    let store = seeded_store();
    store.inject(FaultSpec::once(Fault::Commit));

    let err = scenario(&store, LockPolicy::Serialized).run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Commit);
    // Exactly one of the two serialized updates was applied
    let balance = store.balance_of(&Alias::default()).unwrap();
    assert!(balance == 101.0 || balance == 102.0, "got {}", balance);
}

#[test]
fn failed_connect_is_connection_failure() {
    for policy in POLICIES {
        let store = seeded_store();
        store.inject(FaultSpec::always(Fault::Connect));

        let err = scenario(&store, policy).run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection, "policy {}", policy);
        assert_eq!(store.balance_of(&Alias::default()), Some(INITIAL));
    }
}

#[test]
fn failed_write_with_failed_discard_reports_both() {
    let store = seeded_store();
    store.inject(FaultSpec::always(Fault::Mutate));
    store.inject(FaultSpec::always(Fault::Discard));

    let err = scenario(&store, LockPolicy::Serialized).run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mutation);
    assert!(err.to_string().contains("discard also failed"));
    assert_eq!(store.balance_of(&Alias::default()), Some(INITIAL));
}

#[test]
fn error_names_first_failed_participant() {
    let store = seeded_store();
    // Second read fails; under Serialized that is always participant reading second
    store.inject(FaultSpec::once(Fault::Query).after(1));

    let err = scenario(&store, LockPolicy::Serialized).run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);
    let message = err.to_string();
    assert!(
        message.starts_with(&format!("{} (delta 1) failed", ParticipantId(0)))
            || message.starts_with(&format!("{} (delta 2) failed", ParticipantId(1))),
        "unexpected message {}",
        message
    );
    // The first participant committed before the failure
    let balance = store.balance_of(&Alias::default()).unwrap();
    assert!(balance == 101.0 || balance == 102.0, "got {}", balance);
}

#[test]
fn failed_scenario_can_be_rerun() {
    let store = seeded_store();
    store.inject(FaultSpec::once(Fault::Query));
    let scenario = scenario(&store, LockPolicy::Serialized);
    assert!(scenario.run().is_err());

    let report = scenario.run().unwrap();
    let initial = report.initial_balance().unwrap();
    assert_eq!(report.final_balance, Some(initial + 3.0));
}
