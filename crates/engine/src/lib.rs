//! Scenario engine for walletrace
//!
//! This crate runs the lost-update scenario on top of the store interface:
//! - BalanceAccessor: read and stage a record's balance inside a transaction
//! - Participant: one read-modify-write, coordinated by barrier and lock
//! - Scenario: the driver starting participants and owning the barrier
//! - ScenarioReport: outcomes and the observed interleaving of a run
//!
//! # Example
//!
//! ```ignore
//! use walletrace_engine::Scenario;
//! use walletrace_concurrency::LockPolicy;
//!
//! let scenario = Scenario::builder()
//!     .policy(LockPolicy::Serialized)
//!     .build(connector)?;
//! let report = scenario.run()?;
//! assert!(!report.lost_update());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod participant;
pub mod report;
pub mod scenario;

pub use accessor::BalanceAccessor;
pub use participant::Participant;
pub use report::{
    balances_equal, ParticipantOutcome, ReleaseSource, ScenarioEvent, ScenarioReport, TimedEvent,
};
pub use scenario::{Scenario, ScenarioBuilder, ScenarioContext, DEFAULT_DELTAS};
