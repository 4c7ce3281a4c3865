//! Dgraph HTTP client
//!
//! A thin pass-through from the store interface to the Dgraph HTTP API.
//! No request is ever retried; every transport or server failure is
//! mapped to the failure kind of the operation and returned.
//!
//! # Transaction Sequence
//!
//! ```text
//! POST /query                               → first response pins start_ts and hash
//! POST /mutate?startTs=<ts>&hash=<h>        → keys/preds accumulated
//! POST /commit?startTs=<ts>&hash=<h>        → body {keys, preds}
//! POST /commit?startTs=<ts>&hash=<h>&abort=true   (discard)
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use walletrace_core::{
    Connection, Connector, Error, Lookup, Response, Result, Transaction, Upsert,
};

use crate::wire::{
    endpoint_url, is_conflict_message, parse_envelope, CommitBody, Envelope, MutateBody,
    TxnContext, AUTH_HEADER,
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Endpoint {
    base: String,
    credential: String,
    agent: ureq::Agent,
}

impl Endpoint {
    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let request = self.agent.request(method, url);
        if self.credential.is_empty() {
            request
        } else {
            request.set(AUTH_HEADER, &self.credential)
        }
    }

    /// Send `body` and decode the envelope. Failures are rendered as text
    /// for the caller to wrap in the right kind.
    fn post(&self, url: &str, content_type: &str, body: &str) -> std::result::Result<Envelope, String> {
        let result = self
            .request("POST", url)
            .set("Content-Type", content_type)
            .send_string(body);
        let envelope = read_envelope(result)?;
        envelope.check()?;
        Ok(envelope)
    }
}

fn read_envelope(
    result: std::result::Result<ureq::Response, ureq::Error>,
) -> std::result::Result<Envelope, String> {
    match result {
        Ok(response) => {
            let body = response.into_string().map_err(|e| e.to_string())?;
            parse_envelope(&body)
        }
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            // Dgraph reports most failures inside a JSON envelope
            match parse_envelope(&body).map(|envelope| envelope.check()) {
                Ok(Err(messages)) => Err(format!("HTTP {}: {}", code, messages)),
                _ => Err(format!("HTTP {}: {}", code, body.trim())),
            }
        }
        Err(ureq::Error::Transport(transport)) => Err(transport.to_string()),
    }
}

/// Connects to a Dgraph (or Dgraph Cloud) HTTP endpoint
#[derive(Debug, Clone)]
pub struct DgraphConnector {
    endpoint: Arc<Endpoint>,
}

impl DgraphConnector {
    /// Connector for `endpoint` authenticating with `credential`.
    ///
    /// An empty credential sends no auth header.
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, credential, DEFAULT_TIMEOUT)
    }

    /// Same as [`new`](Self::new) with a custom per-request timeout.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        credential: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: Arc::new(Endpoint {
                base: endpoint.into().trim_end_matches('/').to_string(),
                credential: credential.into(),
                agent,
            }),
        }
    }
}

impl Connector for DgraphConnector {
    type Connection = DgraphConnection;

    /// Probe `/health` and hand out a connection.
    fn connect(&self) -> Result<DgraphConnection> {
        let url = endpoint_url(&self.endpoint.base, "health", None, &[]);
        let endpoint = self.endpoint();
        match self.endpoint.request("GET", &url).call() {
            Ok(_) => {
                debug!(endpoint = %endpoint, "Connected");
                Ok(DgraphConnection {
                    endpoint: Arc::clone(&self.endpoint),
                })
            }
            Err(ureq::Error::Status(code, _)) => Err(Error::Connection {
                endpoint,
                reason: format!("health check returned HTTP {}", code),
            }),
            Err(ureq::Error::Transport(transport)) => Err(Error::Connection {
                endpoint,
                reason: transport.to_string(),
            }),
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint.base.clone()
    }
}

/// An open Dgraph connection
///
/// HTTP is connectionless; the handle only shares the agent's pool.
#[derive(Debug)]
pub struct DgraphConnection {
    endpoint: Arc<Endpoint>,
}

impl Connection for DgraphConnection {
    type Txn = DgraphTxn;

    fn begin(&self) -> Result<DgraphTxn> {
        Ok(DgraphTxn {
            endpoint: Arc::clone(&self.endpoint),
            context: TxnContext::default(),
            finished: false,
        })
    }

    fn close(self) -> Result<()> {
        debug!(endpoint = %self.endpoint.base, "Closed connection");
        Ok(())
    }
}

/// A Dgraph transaction
#[derive(Debug)]
pub struct DgraphTxn {
    endpoint: Arc<Endpoint>,
    context: TxnContext,
    finished: bool,
}

impl DgraphTxn {
    /// Start timestamp, once the server has assigned one.
    pub fn start_ts(&self) -> Option<u64> {
        match self.context.start_ts {
            0 => None,
            ts => Some(ts),
        }
    }

    fn absorb(&mut self, envelope: &Envelope) {
        if let Some(txn) = envelope.txn() {
            self.context.merge(txn);
        }
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidState(format!(
                "{} on a finished transaction",
                op
            )));
        }
        Ok(())
    }
}

impl Transaction for DgraphTxn {
    fn query(&mut self, lookup: &Lookup) -> Result<serde_json::Value> {
        self.ensure_open("query")?;
        let url = endpoint_url(&self.endpoint.base, "query", Some(&self.context), &[]);
        let envelope = self
            .endpoint
            .post(&url, "application/dql", &lookup.to_dql())
            .map_err(Error::Query)?;
        self.absorb(&envelope);
        Ok(envelope.data)
    }

    fn mutate(&mut self, upsert: &Upsert) -> Result<Response> {
        self.ensure_open("mutate")?;
        let body = serde_json::to_string(&MutateBody::from_upsert(upsert))
            .map_err(|e| Error::Encoding(e.to_string()))?;
        let extra: &[(&str, &str)] = if upsert.commit_now {
            &[("commitNow", "true")]
        } else {
            &[]
        };
        let url = endpoint_url(&self.endpoint.base, "mutate", Some(&self.context), extra);
        let envelope = self
            .endpoint
            .post(&url, "application/json", &body)
            .map_err(|message| {
                if is_conflict_message(&message) {
                    Error::AbortedByConflict(message)
                } else {
                    Error::Mutation(message)
                }
            })?;
        self.absorb(&envelope);
        if upsert.commit_now {
            self.finished = true;
        }
        Ok(envelope.mutation_response())
    }

    fn commit(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let Some(start_ts) = self.start_ts() else {
            // Nothing was read or written
            return Ok(());
        };
        let body = serde_json::to_string(&CommitBody {
            keys: &self.context.keys,
            preds: &self.context.preds,
        })
        .map_err(|e| Error::Encoding(e.to_string()))?;
        let url = endpoint_url(&self.endpoint.base, "commit", Some(&self.context), &[]);
        let envelope = self
            .endpoint
            .post(&url, "application/json", &body)
            .map_err(|message| {
                if is_conflict_message(&message) {
                    Error::AbortedByConflict(message)
                } else {
                    Error::Commit(message)
                }
            })?;
        if envelope.txn().map_or(false, |txn| txn.aborted) {
            return Err(Error::AbortedByConflict(format!(
                "transaction {} aborted by the server",
                start_ts
            )));
        }
        debug!(start_ts, keys = self.context.keys.len(), "Committed transaction");
        Ok(())
    }

    fn discard(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let Some(start_ts) = self.start_ts() else {
            return Ok(());
        };
        if !self.context.keys.is_empty() {
            warn!(start_ts, keys = self.context.keys.len(), "Discarding transaction with staged writes");
        }
        let url = endpoint_url(
            &self.endpoint.base,
            "commit",
            Some(&self.context),
            &[("abort", "true")],
        );
        self.endpoint
            .post(&url, "application/json", "{}")
            .map_err(Error::Discard)?;
        Ok(())
    }
}
