//! Dgraph HTTP wire format
//!
//! Every endpoint answers with the same envelope:
//!
//! ```text
//! {
//!   "data":       { ... },                      // query result or mutation summary
//!   "errors":     [ { "message": "..." } ],     // present on failure
//!   "extensions": { "txn": { "start_ts": 7, "hash": "...", "keys": [...], "preds": [...] } }
//! }
//! ```
//!
//! The transaction context in `extensions.txn` pins the start timestamp and
//! hash on the first request and accumulates the conflict keys and
//! predicates that the final commit must present. Every later request of
//! the transaction sends `startTs` and `hash` back as query parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use walletrace_core::{Identity, Response, Upsert};

/// Header carrying the access credential.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Response envelope
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    /// Payload
    #[serde(default)]
    pub data: Value,
    /// Errors reported by the server
    #[serde(default)]
    pub errors: Vec<WireError>,
    /// Transaction context
    #[serde(default)]
    pub extensions: Option<Extensions>,
}

/// One server-side error
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    /// Human-readable message
    pub message: String,
}

/// Envelope extensions
#[derive(Debug, Default, Deserialize)]
pub struct Extensions {
    /// Transaction context, if the request ran in one
    #[serde(default)]
    pub txn: Option<TxnContext>,
}

/// Transaction context as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnContext {
    /// Start timestamp
    #[serde(default)]
    pub start_ts: u64,
    /// Server-issued token pairing later requests with `start_ts`
    #[serde(default)]
    pub hash: String,
    /// Conflict keys touched
    #[serde(default)]
    pub keys: Vec<String>,
    /// Predicates touched
    #[serde(default)]
    pub preds: Vec<String>,
    /// Whether the server aborted the transaction
    #[serde(default)]
    pub aborted: bool,
}

impl TxnContext {
    /// Fold a later response's context into this one.
    ///
    /// The start timestamp and hash are taken from the first response
    /// that carries them; keys and predicates are unioned.
    pub fn merge(&mut self, other: &TxnContext) {
        if self.start_ts == 0 {
            self.start_ts = other.start_ts;
        }
        if self.hash.is_empty() {
            self.hash = other.hash.clone();
        }
        for key in &other.keys {
            if !self.keys.contains(key) {
                self.keys.push(key.clone());
            }
        }
        for pred in &other.preds {
            if !self.preds.contains(pred) {
                self.preds.push(pred.clone());
            }
        }
        self.aborted |= other.aborted;
    }
}

/// Body of a `/mutate` upsert request
#[derive(Debug, Serialize)]
pub struct MutateBody<'a> {
    /// Upsert block resolving the identity variable
    pub query: String,
    /// Set document
    pub set: &'a Value,
}

impl<'a> MutateBody<'a> {
    /// Body for `upsert`.
    pub fn from_upsert(upsert: &'a Upsert) -> Self {
        Self {
            query: upsert.lookup.to_dql(),
            set: &upsert.set,
        }
    }
}

/// Body of a `/commit` request
#[derive(Debug, Serialize)]
pub struct CommitBody<'a> {
    /// Conflict keys
    pub keys: &'a [String],
    /// Predicates
    pub preds: &'a [String],
}

/// Decode an envelope from a response body.
pub fn parse_envelope(body: &str) -> std::result::Result<Envelope, String> {
    serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))
}

impl Envelope {
    /// `Err` with the joined messages if the server reported errors.
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        Err(messages.join("; "))
    }

    /// Transaction context, if any.
    pub fn txn(&self) -> Option<&TxnContext> {
        self.extensions.as_ref().and_then(|ext| ext.txn.as_ref())
    }

    /// Mutation summary as a [`Response`].
    ///
    /// `data.uids` maps blank-node names to the identities the server
    /// allocated for them.
    pub fn mutation_response(&self) -> Response {
        let created: BTreeMap<String, Identity> = self
            .data
            .get("uids")
            .and_then(Value::as_object)
            .map(|uids| {
                uids.iter()
                    .filter_map(|(name, uid)| {
                        uid.as_str().map(|uid| (name.clone(), Identity::new(uid)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Response {
            touched: created.values().cloned().collect(),
            created,
        }
    }
}

/// Whether a failure message describes a transaction conflict.
pub fn is_conflict_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("aborted") || lower.contains("conflict")
}

/// Join `base` and `path`.
///
/// Once `txn` holds a start timestamp the URL carries `startTs`, followed
/// by `hash` when the server issued one, ahead of the `extra` parameters.
pub fn endpoint_url(
    base: &str,
    path: &str,
    txn: Option<&TxnContext>,
    extra: &[(&str, &str)],
) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    let mut params: Vec<String> = Vec::new();
    if let Some(txn) = txn.filter(|txn| txn.start_ts != 0) {
        params.push(format!("startTs={}", txn.start_ts));
        if !txn.hash.is_empty() {
            params.push(format!("hash={}", txn.hash));
        }
    }
    for (key, value) in extra {
        params.push(format!("{}={}", key, value));
    }
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}
