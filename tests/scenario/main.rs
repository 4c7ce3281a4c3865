//! Scenario Test Suite
//!
//! Runs the full driver against the in-memory store and checks the outcome
//! and interleaving of each strategy.
//!
//! ## Key Verification Points
//!
//! 1. Unlocked: both reads precede both writes and one update is lost
//! 2. Serialized: every update lands, whatever the deltas
//! 3. A failing participant never leaves its peers blocked
//! 4. A discarded transaction leaves the stored balance untouched
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test scenario
//! cargo test --test scenario serialized::
//! ```

use walletrace_concurrency::LockPolicy;
use walletrace_core::{Alias, Balance, Connection, Connector, Lookup, Schema, Transaction, Upsert};
use walletrace_engine::{Scenario, ScenarioReport};
use walletrace_storage::{ConflictPolicy, MemoryStore};

// Test modules
pub mod failures;
pub mod lost_update;
pub mod serialized;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Starting balance used across the suite.
pub const INITIAL: Balance = 100.0;

/// Store holding record `a` at [`INITIAL`].
pub fn seeded_store() -> MemoryStore {
    seeded_store_with(ConflictPolicy::LastWriterWins, INITIAL)
}

/// Store under `policy` holding record `a` at `balance`.
pub fn seeded_store_with(policy: ConflictPolicy, balance: Balance) -> MemoryStore {
    let store = MemoryStore::with_policy(policy);
    store.seed(&Alias::default(), balance);
    store
}

/// Default two-participant scenario under `policy`.
pub fn scenario(store: &MemoryStore, policy: LockPolicy) -> Scenario<MemoryStore> {
    Scenario::<MemoryStore>::builder()
        .policy(policy)
        .build(store.clone())
        .expect("valid scenario")
}

/// Run the default scenario and return its report.
pub fn run(store: &MemoryStore, policy: LockPolicy) -> ScenarioReport {
    scenario(store, policy).run().expect("scenario should succeed")
}

/// Commit a second record carrying alias `a`, bypassing the upsert on `a`.
pub fn add_duplicate_record(store: &MemoryStore, balance: Balance) {
    let schema = Schema::default();
    // Lookup on an alias nobody has, so the upsert always creates
    let lookup = Lookup::by_alias(&schema, &Alias::new("nobody")).bind_uid("v");
    let set = serde_json::json!({
        "uid": Upsert::var_ref("v"),
        (schema.alias_predicate.as_str()): "a",
        (schema.balance_predicate.as_str()): balance,
    });

    let conn = store.connect().expect("connect");
    let mut txn = conn.begin().expect("begin");
    txn.mutate(&Upsert::new(lookup, set)).expect("mutate");
    txn.commit().expect("commit");
    conn.close().expect("close");
}
