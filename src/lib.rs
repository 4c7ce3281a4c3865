//! # Walletrace
//!
//! Two concurrent read-modify-writes against one balance in a transactional
//! store, coordinated so that both reads happen before either write.
//!
//! Run unlocked, one update is lost. Run with the whole transaction under an
//! exclusive lock, both updates land.
//!
//! ## Quick Start
//!
//! ```ignore
//! use walletrace::prelude::*;
//!
//! let backend = Backend::memory_seeded(&Alias::default(), 100.0);
//! let report = backend.run(&ScenarioConfig::default())?;
//! assert_eq!(report.final_balance, Some(103.0));
//! ```
//!
//! ## Crates
//!
//! - `walletrace-core`: types, errors, store interface
//! - `walletrace-storage`: in-memory transactional store
//! - `walletrace-dgraph`: Dgraph HTTP adapter
//! - `walletrace-concurrency`: barrier and lock policy
//! - `walletrace-engine`: accessor, participants, scenario driver
//! - `walletrace-config`: configuration files

#![warn(missing_docs)]

mod backend;

pub mod prelude;

pub use backend::Backend;

pub use walletrace_concurrency::{LockPolicy, Rendezvous};
pub use walletrace_config::{Config, DgraphConfig, ScenarioConfig};
pub use walletrace_core::{Alias, Balance, Error, ErrorKind, Result};
pub use walletrace_dgraph::DgraphConnector;
pub use walletrace_engine::{Scenario, ScenarioBuilder, ScenarioEvent, ScenarioReport};
pub use walletrace_storage::{ConflictPolicy, MemoryStore};
