//! In-process transactional store
//!
//! [`MemoryStore`] implements the store interface with the semantics the
//! scenario relies on:
//! - Snapshot isolation: a transaction reads the committed state as of its
//!   `begin()`, overlaid with its own staged writes
//! - Staged mutations: nothing is visible to others until commit
//! - Atomic commit under a commit lock, one version per commit
//! - Configurable conflict detection ([`ConflictPolicy`])
//!
//! # Commit Sequence
//!
//! ```text
//! 1. Acquire commit lock
//! 2. IF FirstCommitterWins: reject if any written identity was committed
//!    after this transaction's snapshot
//! 3. Allocate commit version
//! 4. Apply staged predicates to committed nodes
//! 5. Release commit lock
//! ```

use crate::fault::{Fault, FaultInjector, FaultSpec, FaultTriggerRecord};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use walletrace_core::{
    Alias, Balance, Connection, Connector, Error, Identity, Lookup, Record, Response, Result,
    Schema, Transaction, Upsert, QUERY_BLOCK,
};

/// Predicate values of one record.
type Node = BTreeMap<String, Value>;

/// How commits of overlapping writes are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Apply staged writes unconditionally; the later commit wins
    #[default]
    LastWriterWins,
    /// Abort a commit whose written records changed since its snapshot
    FirstCommitterWins,
}

#[derive(Debug, Default)]
struct Committed {
    nodes: BTreeMap<Identity, Node>,
    /// Version of the last commit that wrote each identity
    written_at: BTreeMap<Identity, u64>,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<Committed>,
    /// Global commit version
    ///
    /// Monotonically increasing. Each successful commit increments by 1.
    version: AtomicU64,
    next_uid: AtomicU64,
    next_connection: AtomicU64,
    /// Serializes validation and apply
    commit_lock: Mutex<()>,
    policy: ConflictPolicy,
    schema: Schema,
    faults: FaultInjector,
    commits: AtomicU64,
    aborts: AtomicU64,
}

impl Shared {
    fn allocate_identity(&self) -> Identity {
        Identity::from_u64(self.next_uid.fetch_add(1, Ordering::SeqCst))
    }

    fn fail(&self, fault: Fault) -> Option<String> {
        self.faults.check(fault)
    }

    fn apply(&self, staged: BTreeMap<Identity, Node>, start_version: u64) -> Result<u64> {
        let _commit_guard = self.commit_lock.lock();

        if self.policy == ConflictPolicy::FirstCommitterWins {
            let state = self.state.read();
            for identity in staged.keys() {
                if let Some(&written) = state.written_at.get(identity) {
                    if written > start_version {
                        self.aborts.fetch_add(1, Ordering::Relaxed);
                        return Err(Error::AbortedByConflict(format!(
                            "{} was committed at version {} after snapshot {}",
                            identity, written, start_version
                        )));
                    }
                }
            }
        }

        Ok(self.install(staged))
    }

    /// Write staged predicates at a fresh version. Caller holds the commit lock.
    fn install(&self, staged: BTreeMap<Identity, Node>) -> u64 {
        let commit_version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write();
        for (identity, predicates) in staged {
            state.nodes.entry(identity.clone()).or_default().extend(predicates);
            state.written_at.insert(identity, commit_version);
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        commit_version
    }
}

/// In-memory transactional store
///
/// Cheap to clone; clones share the same committed state.
///
/// # Example
///
/// ```ignore
/// use walletrace_storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.seed(&"a".into(), 100.0);
/// let conn = store.connect()?;
/// let txn = conn.begin()?;
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store with last-writer-wins commits.
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::default())
    }

    /// Create an empty store with the given conflict policy.
    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self::with_schema(policy, Schema::default())
    }

    /// Create an empty store with a custom predicate schema.
    pub fn with_schema(policy: ConflictPolicy, schema: Schema) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: RwLock::new(Committed::default()),
                version: AtomicU64::new(0),
                next_uid: AtomicU64::new(1),
                next_connection: AtomicU64::new(1),
                commit_lock: Mutex::new(()),
                policy,
                schema,
                faults: FaultInjector::new(),
                commits: AtomicU64::new(0),
                aborts: AtomicU64::new(0),
            }),
        }
    }

    /// Conflict policy in effect.
    pub fn policy(&self) -> ConflictPolicy {
        self.inner.policy
    }

    /// Current committed version.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }

    /// Number of commits rejected by conflict detection.
    pub fn abort_count(&self) -> u64 {
        self.inner.aborts.load(Ordering::Relaxed)
    }

    /// Arm a fault rule.
    pub fn inject(&self, spec: FaultSpec) {
        self.inner.faults.inject(spec);
    }

    /// Disarm every fault rule.
    pub fn clear_faults(&self) {
        self.inner.faults.clear();
    }

    /// Faults fired so far.
    pub fn triggered_faults(&self) -> Vec<FaultTriggerRecord> {
        self.inner.faults.triggered()
    }

    /// Create or overwrite the record for `alias`, outside any transaction.
    ///
    /// Returns the record's identity.
    pub fn seed(&self, alias: &Alias, balance: Balance) -> Identity {
        let schema = &self.inner.schema;
        let mut node = Node::new();
        node.insert(
            schema.alias_predicate.clone(),
            Value::String(alias.as_str().to_string()),
        );
        node.insert(schema.balance_predicate.clone(), balance_value(balance));

        // Out of band: never validated against concurrent transactions.
        // Lookup and install share the commit lock so one alias never gets
        // two records.
        let _commit_guard = self.inner.commit_lock.lock();
        let identity = self
            .identity_of(alias)
            .unwrap_or_else(|| self.inner.allocate_identity());
        let mut staged = BTreeMap::new();
        staged.insert(identity.clone(), node);
        let version = self.inner.install(staged);
        debug!(alias = %alias, balance, identity = %identity, version, "Seeded record");
        identity
    }

    /// Identity of the first committed node carrying `alias`, balance or not.
    fn identity_of(&self, alias: &Alias) -> Option<Identity> {
        let predicate = &self.inner.schema.alias_predicate;
        self.inner
            .state
            .read()
            .nodes
            .iter()
            .find(|(_, node)| alias_matches(node, predicate, alias.as_str()))
            .map(|(identity, _)| identity.clone())
    }

    /// First committed record carrying `alias`.
    pub fn find(&self, alias: &Alias) -> Option<Record> {
        let schema = &self.inner.schema;
        let state = self.inner.state.read();
        let mut matches = state
            .nodes
            .iter()
            .filter(|(_, node)| alias_matches(node, &schema.alias_predicate, alias.as_str()));
        let (identity, node) = matches.next()?;
        let balance = node.get(&schema.balance_predicate)?.as_f64()?;
        Some(Record {
            alias: alias.clone(),
            identity: identity.clone(),
            balance,
        })
    }

    /// Committed balance for `alias`.
    pub fn balance_of(&self, alias: &Alias) -> Option<Balance> {
        self.find(alias).map(|record| record.balance)
    }

    /// Number of committed records carrying `alias`.
    pub fn count_alias(&self, alias: &Alias) -> usize {
        let predicate = &self.inner.schema.alias_predicate;
        self.inner
            .state
            .read()
            .nodes
            .values()
            .filter(|node| alias_matches(node, predicate, alias.as_str()))
            .count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemoryStore {
    type Connection = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection> {
        if let Some(reason) = self.inner.fail(Fault::Connect) {
            return Err(Error::Connection {
                endpoint: self.endpoint(),
                reason,
            });
        }
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, "Opened memory connection");
        Ok(MemoryConnection {
            store: Arc::clone(&self.inner),
            id,
        })
    }

    fn endpoint(&self) -> String {
        "memory://local".to_string()
    }
}

/// Connection to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    store: Arc<Shared>,
    id: u64,
}

impl MemoryConnection {
    /// Connection number, unique per store.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Connection for MemoryConnection {
    type Txn = MemoryTxn;

    fn begin(&self) -> Result<MemoryTxn> {
        let state = self.store.state.read();
        let start_version = self.store.version.load(Ordering::SeqCst);
        Ok(MemoryTxn {
            store: Arc::clone(&self.store),
            start_version,
            snapshot: state.nodes.clone(),
            staged: BTreeMap::new(),
            finished: false,
        })
    }

    fn close(self) -> Result<()> {
        if let Some(reason) = self.store.fail(Fault::Close) {
            return Err(Error::Close(reason));
        }
        debug!(connection = self.id, "Closed memory connection");
        Ok(())
    }
}

/// Transaction on a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryTxn {
    store: Arc<Shared>,
    start_version: u64,
    snapshot: BTreeMap<Identity, Node>,
    staged: BTreeMap<Identity, Node>,
    /// Set once a `commit_now` mutation has committed the transaction
    finished: bool,
}

impl MemoryTxn {
    /// Version of the snapshot this transaction reads from.
    pub fn start_version(&self) -> u64 {
        self.start_version
    }

    /// Node as seen by this transaction.
    fn view(&self, identity: &Identity) -> Node {
        let mut node = self.snapshot.get(identity).cloned().unwrap_or_default();
        if let Some(staged) = self.staged.get(identity) {
            node.extend(staged.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        node
    }

    fn identities(&self) -> BTreeSet<Identity> {
        self.snapshot
            .keys()
            .chain(self.staged.keys())
            .cloned()
            .collect()
    }

    fn resolve(&self, lookup: &Lookup) -> Vec<(Identity, Node)> {
        self.identities()
            .into_iter()
            .map(|identity| {
                let node = self.view(&identity);
                (identity, node)
            })
            .filter(|(_, node)| alias_matches(node, &lookup.predicate, &lookup.value))
            .collect()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidState(
                "transaction already committed by a commit_now mutation".to_string(),
            ));
        }
        Ok(())
    }

    fn stage_document(
        &mut self,
        doc: &Map<String, Value>,
        bound: &BTreeMap<String, Vec<Identity>>,
        response: &mut Response,
    ) -> Result<()> {
        let targets = match doc.get("uid") {
            None => vec![self.store.allocate_identity()],
            Some(Value::String(raw)) => {
                if let Some(var) = Upsert::parse_var_ref(raw) {
                    match bound.get(var) {
                        Some(ids) if !ids.is_empty() => ids.clone(),
                        Some(_) => vec![self.store.allocate_identity()],
                        None => {
                            return Err(Error::Mutation(format!(
                                "set document references unbound variable {}",
                                var
                            )))
                        }
                    }
                } else if let Some(blank) = raw.strip_prefix("_:") {
                    let identity = self.store.allocate_identity();
                    response.created.insert(blank.to_string(), identity.clone());
                    vec![identity]
                } else {
                    vec![Identity::new(raw.clone())]
                }
            }
            Some(other) => {
                return Err(Error::Mutation(format!("uid must be a string, got {}", other)))
            }
        };

        for identity in targets {
            let staged = self.staged.entry(identity.clone()).or_default();
            for (predicate, value) in doc.iter().filter(|(k, _)| k.as_str() != "uid") {
                staged.insert(predicate.clone(), value.clone());
            }
            response.touched.push(identity);
        }
        Ok(())
    }
}

impl Transaction for MemoryTxn {
    fn query(&mut self, lookup: &Lookup) -> Result<Value> {
        self.ensure_active()?;
        if let Some(reason) = self.store.fail(Fault::Query) {
            return Err(Error::Query(reason));
        }

        let rows: Vec<Value> = self
            .resolve(lookup)
            .into_iter()
            .map(|(identity, node)| {
                let mut row = Map::new();
                if lookup.bind.is_some() {
                    row.insert("uid".to_string(), Value::String(identity.to_string()));
                }
                for field in &lookup.fields {
                    // Absent predicates are omitted, not null
                    if let Some(value) = node.get(&field.predicate) {
                        row.insert(field.label.clone(), value.clone());
                    }
                }
                Value::Object(row)
            })
            .collect();

        let mut result = Map::new();
        result.insert(QUERY_BLOCK.to_string(), Value::Array(rows));
        Ok(Value::Object(result))
    }

    fn mutate(&mut self, upsert: &Upsert) -> Result<Response> {
        self.ensure_active()?;
        if let Some(reason) = self.store.fail(Fault::Mutate) {
            return Err(Error::Mutation(reason));
        }

        let mut bound = BTreeMap::new();
        if let Some(var) = &upsert.lookup.bind {
            let ids = self
                .resolve(&upsert.lookup)
                .into_iter()
                .map(|(identity, _)| identity)
                .collect::<Vec<_>>();
            bound.insert(var.clone(), ids);
        }

        let docs: Vec<&Map<String, Value>> = match &upsert.set {
            Value::Object(doc) => vec![doc],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object().ok_or_else(|| {
                        Error::Mutation("set array entries must be objects".to_string())
                    })
                })
                .collect::<Result<_>>()?,
            other => {
                return Err(Error::Mutation(format!(
                    "set document must be an object or array, got {}",
                    other
                )))
            }
        };

        let mut response = Response::default();
        for doc in docs {
            self.stage_document(doc, &bound, &mut response)?;
        }

        if upsert.commit_now {
            let staged = std::mem::take(&mut self.staged);
            self.store.apply(staged, self.start_version)?;
            self.finished = true;
        }
        Ok(response)
    }

    fn commit(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(reason) = self.store.fail(Fault::Commit) {
            return Err(Error::Commit(reason));
        }
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(());
        }
        let version = self.store.apply(staged, self.start_version)?;
        debug!(version, start_version = self.start_version, "Committed transaction");
        Ok(())
    }

    fn discard(self) -> Result<()> {
        if let Some(reason) = self.store.fail(Fault::Discard) {
            return Err(Error::Discard(reason));
        }
        if !self.staged.is_empty() {
            warn!(
                start_version = self.start_version,
                staged = self.staged.len(),
                "Discarded transaction with staged writes"
            );
        }
        Ok(())
    }
}

fn alias_matches(node: &Node, predicate: &str, value: &str) -> bool {
    matches!(node.get(predicate), Some(Value::String(s)) if s == value)
}

fn balance_value(balance: Balance) -> Value {
    serde_json::Number::from_f64(balance)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
