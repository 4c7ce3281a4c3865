//! Concurrency layer for walletrace
//!
//! This crate implements the coordination primitives of a scenario:
//! - Rendezvous: expected-count barrier with external release and breakage
//! - LockPolicy: unlocked vs lock-serialized read-modify-write
//! - ExclusiveLock: the lock held across a whole transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod barrier;
pub mod policy;

pub use barrier::{Arrival, BarrierState, Rendezvous};
pub use policy::{ExclusiveGuard, ExclusiveLock, LockPolicy, ReleaseMode};
