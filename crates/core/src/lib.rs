//! Core types for walletrace
//!
//! This crate defines the vocabulary shared by every other crate:
//! - Types: ScenarioId, Alias, Identity, Record, ParticipantId
//! - Error: the failure taxonomy with context wrapping
//! - Requests: typed lookups and upserts with DQL rendering
//! - Traits: Connector, Connection, Transaction (the store interface)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod request;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use request::{Lookup, Projection, Response, Schema, Upsert, QUERY_BLOCK};
pub use traits::{Connection, Connector, Transaction};
pub use types::{Alias, Balance, Identity, ParticipantId, Record, ScenarioId};
