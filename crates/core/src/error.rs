//! Error types for walletrace
//!
//! One enum covers every failure a scenario can produce, from the store
//! round trips up to the barrier. Failures travel upward wrapped in
//! [`Error::Context`] layers that describe the operation which failed; the
//! underlying kind is preserved and can always be recovered with
//! [`Error::kind`].
//!
//! ## Kinds
//!
//! | Kind | Raised by |
//! |------|-----------|
//! | Connection | connector cannot reach the store |
//! | Query | store rejects or fails a lookup |
//! | Parse | lookup result is not the expected shape |
//! | NotFound | lookup matched zero records |
//! | Encoding | mutation document cannot be serialized |
//! | Mutation | store rejects or fails a mutation |
//! | Commit | store fails to commit |
//! | AbortedByConflict | store aborts the commit because of a concurrent writer |
//! | Discard | store fails to discard |
//! | Close | connection cannot be closed cleanly |
//! | ConfigLoad | configuration file missing or malformed |
//! | BarrierBroken | a peer failed while this participant waited at the barrier |
//! | InvalidState | a primitive was used outside its contract |

use thiserror::Error;

/// Result type for walletrace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// All walletrace errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to the store failed
    #[error("connection failure ({endpoint}): {reason}")]
    Connection {
        /// Endpoint that could not be reached
        endpoint: String,
        /// Transport-level reason
        reason: String,
    },

    /// Lookup failed in the store
    #[error("query failure: {0}")]
    Query(String),

    /// Lookup result could not be decoded
    #[error("parse failure: {0}")]
    Parse(String),

    /// Lookup matched no record
    #[error("record not found: alias {alias:?}")]
    NotFound {
        /// Alias that was looked up
        alias: String,
    },

    /// Mutation document could not be encoded
    #[error("encoding failure: {0}")]
    Encoding(String),

    /// Mutation failed in the store
    #[error("mutation failure: {0}")]
    Mutation(String),

    /// Commit failed in the store
    #[error("commit failure: {0}")]
    Commit(String),

    /// Commit aborted because a concurrent transaction won
    #[error("transaction aborted by conflict: {0}")]
    AbortedByConflict(String),

    /// Discard failed in the store
    #[error("discard failure: {0}")]
    Discard(String),

    /// Connection close failed
    #[error("close failure: {0}")]
    Close(String),

    /// Configuration missing or malformed
    #[error("config load failure: {0}")]
    ConfigLoad(String),

    /// Barrier was broken while waiting
    #[error("barrier broken: {0}")]
    BarrierBroken(String),

    /// Primitive used outside its contract
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A failure wrapped with a description of the operation that failed
    #[error("{context}: {inner}")]
    Context {
        /// What was being attempted
        context: String,
        /// The wrapped failure
        inner: Box<Error>,
    },
}

/// Discriminant of [`Error`] with context layers stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Connection`]
    Connection,
    /// See [`Error::Query`]
    Query,
    /// See [`Error::Parse`]
    Parse,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::Encoding`]
    Encoding,
    /// See [`Error::Mutation`]
    Mutation,
    /// See [`Error::Commit`]
    Commit,
    /// See [`Error::AbortedByConflict`]
    AbortedByConflict,
    /// See [`Error::Discard`]
    Discard,
    /// See [`Error::Close`]
    Close,
    /// See [`Error::ConfigLoad`]
    ConfigLoad,
    /// See [`Error::BarrierBroken`]
    BarrierBroken,
    /// See [`Error::InvalidState`]
    InvalidState,
}

impl Error {
    /// Wrap this error with a description of the failed operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            inner: Box::new(self),
        }
    }

    /// The innermost error, with every context layer removed.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { inner, .. } = current {
            current = inner;
        }
        current
    }

    /// Kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Query(_) => ErrorKind::Query,
            Error::Parse(_) => ErrorKind::Parse,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Encoding(_) => ErrorKind::Encoding,
            Error::Mutation(_) => ErrorKind::Mutation,
            Error::Commit(_) => ErrorKind::Commit,
            Error::AbortedByConflict(_) => ErrorKind::AbortedByConflict,
            Error::Discard(_) => ErrorKind::Discard,
            Error::Close(_) => ErrorKind::Close,
            Error::ConfigLoad(_) => ErrorKind::ConfigLoad,
            Error::BarrierBroken(_) => ErrorKind::BarrierBroken,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Context { .. } => unreachable!("root() strips context layers"),
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if the store aborted the transaction because of a conflict.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::AbortedByConflict
    }

    /// Check if this error comes from a peer failure at the barrier.
    pub fn is_barrier_broken(&self) -> bool {
        self.kind() == ErrorKind::BarrierBroken
    }
}

/// Context wrapping for results, mirroring [`Error::context`].
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a fixed description.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wrap the error, if any, with a lazily built description.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_kind() {
        let err = Error::NotFound {
            alias: "a".to_string(),
        }
        .context("Unable to getWalletBalance")
        .context("participant 0");

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_context_display_chains_messages() {
        let err = Error::Commit("deadline exceeded".to_string()).context("Unable to commit");
        assert_eq!(
            err.to_string(),
            "Unable to commit: commit failure: deadline exceeded"
        );
    }

    #[test]
    fn test_root_strips_all_layers() {
        let err = Error::Discard("gone".to_string())
            .context("one")
            .context("two")
            .context("three");
        assert!(matches!(err.root(), Error::Discard(msg) if msg == "gone"));
    }

    #[test]
    fn test_result_ext_with_context_is_lazy() {
        let ok: Result<u32> = Ok(7);
        let value = ok
            .with_context(|| -> String { panic!("must not build context for Ok") })
            .unwrap();
        assert_eq!(value, 7);

        let err: Result<u32> = Err(Error::Query("timeout".to_string()));
        let wrapped = err.with_context(|| format!("lookup {}", "a")).unwrap_err();
        assert_eq!(wrapped.kind(), ErrorKind::Query);
        assert!(wrapped.to_string().starts_with("lookup a: "));
    }

    #[test]
    fn test_conflict_and_barrier_predicates() {
        assert!(Error::AbortedByConflict("ts".into()).is_conflict());
        assert!(Error::BarrierBroken("peer".into())
            .context("wait")
            .is_barrier_broken());
    }
}
