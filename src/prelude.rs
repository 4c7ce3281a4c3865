//! Convenient imports for walletrace.
//!
//! ```ignore
//! use walletrace::prelude::*;
//! ```

// Entry point
pub use crate::backend::Backend;

// Error handling
pub use walletrace_core::{Error, ErrorKind, Result, ResultExt};

// Core types
pub use walletrace_core::{Alias, Balance, ParticipantId, ScenarioId};

// Configuration
pub use walletrace_config::{Config, ScenarioConfig};

// Strategy and results
pub use walletrace_concurrency::LockPolicy;
pub use walletrace_engine::{ParticipantOutcome, ScenarioEvent, ScenarioReport};
