//! Storage layer for walletrace
//!
//! This crate implements an in-process transactional store:
//! - MemoryStore: snapshot-isolated transactions with staged upserts
//! - ConflictPolicy: last-writer-wins or first-committer-wins commits
//! - FaultInjector: deterministic failures for every store operation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fault;
pub mod memory;

pub use fault::{Fault, FaultInjector, FaultSpec, FaultTriggerRecord};
pub use memory::{ConflictPolicy, MemoryConnection, MemoryStore, MemoryTxn};
