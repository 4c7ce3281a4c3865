//! Dgraph store adapter for walletrace
//!
//! Implements the store interface over the Dgraph HTTP API:
//! - DgraphConnector: endpoint plus access credential, health-probed connect
//! - DgraphTxn: query, upsert, commit and abort against one start timestamp
//! - wire: the JSON envelope and request bodies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod wire;

pub use client::{DgraphConnection, DgraphConnector, DgraphTxn, DEFAULT_TIMEOUT};
pub use wire::{TxnContext, AUTH_HEADER};
