//! The narrow store interface
//!
//! Everything the scenario needs from a transactional store: open a
//! connection, begin a transaction, look up, upsert, commit or discard.
//! Implementations perform no business logic and never retry; every
//! failure is returned to the caller unchanged.

use crate::error::Result;
use crate::request::{Lookup, Response, Upsert};

/// Opens connections to a store
///
/// Holds whatever the store needs to be reached (endpoint, credential).
/// Shared by all participants of a scenario, hence `Sync`.
pub trait Connector: Send + Sync {
    /// Connection type produced by this connector
    type Connection: Connection;

    /// Open a new connection.
    fn connect(&self) -> Result<Self::Connection>;

    /// Human-readable endpoint, for logs and error context.
    fn endpoint(&self) -> String;
}

/// An open connection
pub trait Connection: Send {
    /// Transaction type produced by this connection
    type Txn: Transaction;

    /// Begin a new transaction.
    fn begin(&self) -> Result<Self::Txn>;

    /// Close the connection.
    fn close(self) -> Result<()>;
}

/// A transaction handle
///
/// Owned by exactly one participant. [`commit`](Transaction::commit) and
/// [`discard`](Transaction::discard) consume the handle, so a transaction
/// is finished exactly once.
pub trait Transaction: Send {
    /// Run a lookup and return the JSON result, keyed by query block name.
    fn query(&mut self, lookup: &Lookup) -> Result<serde_json::Value>;

    /// Run an upsert. Staged unless `upsert.commit_now` is set.
    fn mutate(&mut self, upsert: &Upsert) -> Result<Response>;

    /// Commit staged mutations.
    fn commit(self) -> Result<()>;

    /// Abandon staged mutations.
    fn discard(self) -> Result<()>;
}
