//! Scenario driver
//!
//! Starts one thread per participant against the same record, watches their
//! progress signals, and decides when the barrier opens:
//!
//! - `Unlocked`: the barrier opens itself once every participant has
//!   arrived; both reads precede both writes
//! - `Serialized`: the driver opens it on the first read signal; each read
//!   follows the previous commit
//!
//! If a participant fails before the barrier opens, the driver breaks it so
//! waiting peers discard their transactions instead of blocking forever.
//! The first failure observed is the scenario's failure.

use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};
use walletrace_concurrency::{ExclusiveLock, LockPolicy, ReleaseMode, Rendezvous};
use walletrace_core::{
    Alias, Balance, Connection, Connector, Error, ParticipantId, Result, ResultExt, ScenarioId,
    Schema, Transaction,
};

use crate::accessor::BalanceAccessor;
use crate::participant::Participant;
use crate::report::{ParticipantOutcome, ReleaseSource, ScenarioEvent, ScenarioReport};

/// Deltas applied when none are configured.
pub const DEFAULT_DELTAS: [Balance; 2] = [1.0, 2.0];

/// Shared state handed to every participant of one run
#[derive(Debug)]
pub struct ScenarioContext<'a, C> {
    id: ScenarioId,
    connector: &'a C,
    accessor: BalanceAccessor,
    policy: LockPolicy,
    barrier: Rendezvous,
    lock: ExclusiveLock,
}

impl<'a, C: Connector> ScenarioContext<'a, C> {
    /// Context for `participants` workers with a fresh barrier and lock.
    pub fn new(
        connector: &'a C,
        accessor: BalanceAccessor,
        policy: LockPolicy,
        participants: usize,
    ) -> Self {
        Self {
            id: ScenarioId::new(),
            connector,
            accessor,
            policy,
            barrier: Rendezvous::new(participants),
            lock: ExclusiveLock::new(),
        }
    }

    /// Run identifier.
    pub fn id(&self) -> ScenarioId {
        self.id
    }

    /// Store connector.
    pub fn connector(&self) -> &'a C {
        self.connector
    }

    /// Record accessor.
    pub fn accessor(&self) -> &BalanceAccessor {
        &self.accessor
    }

    /// Strategy in force.
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Read/write barrier.
    pub fn barrier(&self) -> &Rendezvous {
        &self.barrier
    }

    /// Exclusive lock used under `Serialized`.
    pub fn lock(&self) -> &ExclusiveLock {
        &self.lock
    }
}

/// Builder for [`Scenario`]
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    alias: Alias,
    schema: Schema,
    deltas: Vec<Balance>,
    policy: LockPolicy,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self {
            alias: Alias::default(),
            schema: Schema::default(),
            deltas: DEFAULT_DELTAS.to_vec(),
            policy: LockPolicy::default(),
        }
    }
}

impl ScenarioBuilder {
    /// Builder with alias `a`, deltas `+1`/`+2` and the serialized policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record to contend on.
    pub fn alias(mut self, alias: impl Into<Alias>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Predicate names.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// One participant per delta.
    pub fn deltas(mut self, deltas: impl IntoIterator<Item = Balance>) -> Self {
        self.deltas = deltas.into_iter().collect();
        self
    }

    /// Strategy.
    pub fn policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build a scenario over `connector`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if there are no deltas, a delta is not finite, or the
    /// alias is empty.
    pub fn build<C: Connector>(self, connector: C) -> Result<Scenario<C>> {
        if self.deltas.is_empty() {
            return Err(Error::InvalidState(
                "a scenario needs at least one participant".to_string(),
            ));
        }
        if let Some(bad) = self.deltas.iter().find(|d| !d.is_finite()) {
            return Err(Error::InvalidState(format!("delta {} is not finite", bad)));
        }
        if self.alias.as_str().is_empty() {
            return Err(Error::InvalidState("alias must not be empty".to_string()));
        }

        let participants = self
            .deltas
            .iter()
            .enumerate()
            .map(|(i, delta)| Participant::new(ParticipantId(i), *delta))
            .collect();
        Ok(Scenario {
            connector,
            accessor: BalanceAccessor::with_schema(self.alias, self.schema),
            policy: self.policy,
            participants,
        })
    }
}

/// Concurrent read-modify-write of one record
#[derive(Debug)]
pub struct Scenario<C> {
    connector: C,
    accessor: BalanceAccessor,
    policy: LockPolicy,
    participants: Vec<Participant>,
}

impl<C: Connector> Scenario<C> {
    /// Builder with defaults.
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder::new()
    }

    /// Strategy in force.
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Participants, in id order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Store connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Record accessor.
    pub fn accessor(&self) -> &BalanceAccessor {
        &self.accessor
    }

    /// Run every participant to completion.
    ///
    /// Each run gets a fresh barrier and lock, so a scenario can be run
    /// repeatedly.
    ///
    /// # Errors
    ///
    /// The first participant failure, wrapped with the participant and its
    /// delta, or the failure of the final balance read.
    pub fn run(&self) -> Result<ScenarioReport> {
        let ctx = ScenarioContext::new(
            &self.connector,
            self.accessor.clone(),
            self.policy,
            self.participants.len(),
        );
        info!(
            scenario = %ctx.id(),
            policy = %self.policy,
            alias = %self.accessor.alias(),
            participants = self.participants.len(),
            endpoint = %self.connector.endpoint(),
            "Starting scenario"
        );

        let mut report = ScenarioReport::new(ctx.id(), self.policy);
        let mut failure_order = Vec::new();
        let (tx, rx) = mpsc::channel();

        let results: Vec<Result<ParticipantOutcome>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .participants
                .iter()
                .map(|participant| {
                    let tx = tx.clone();
                    let ctx = &ctx;
                    scope.spawn(move || participant.run(ctx, &tx))
                })
                .collect();
            drop(tx);

            // Ends once every participant has dropped its sender
            for event in rx {
                let follow_up = react(&ctx, &event);
                if let ScenarioEvent::Failed { participant, .. } = &event {
                    failure_order.push(*participant);
                }
                report.record(event);
                if let Some(follow_up) = follow_up {
                    report.record(follow_up);
                }
            }

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut outcomes = Vec::with_capacity(results.len());
        let mut errors: Vec<Option<Error>> = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(outcome) => {
                    outcomes.push(outcome);
                    errors.push(None);
                }
                Err(e) => errors.push(Some(e)),
            }
        }

        let first_failed = failure_order
            .iter()
            .map(|p| p.0)
            .chain(0..errors.len())
            .find(|&i| errors.get(i).map_or(false, Option::is_some));
        if let Some(index) = first_failed {
            let participant = self.participants[index];
            let failed = errors.iter().filter(|e| e.is_some()).count();
            warn!(
                scenario = %ctx.id(),
                failed,
                first = %participant.id(),
                "Scenario aborted"
            );
            if let Some(err) = errors.swap_remove(index) {
                return Err(err.context(format!(
                    "{} (delta {}) failed",
                    participant.id(),
                    participant.delta()
                )));
            }
        }

        report.outcomes = outcomes;
        report.final_balance = Some(
            self.read_balance()
                .context("Unable to read final balance")?,
        );
        info!(
            scenario = %ctx.id(),
            balance = report.final_balance,
            lost_update = report.lost_update(),
            "Finished"
        );
        Ok(report)
    }

    /// Committed balance, read in a throwaway transaction.
    pub fn read_balance(&self) -> Result<Balance> {
        self.with_transaction(|accessor, txn| accessor.read_balance(txn), false)
    }

    /// Create or overwrite the record with `balance` and commit.
    pub fn seed(&self, balance: Balance) -> Result<()> {
        self.with_transaction(
            |accessor, txn| accessor.seed_record(txn, balance).map(|_| ()),
            true,
        )?;
        info!(alias = %self.accessor.alias(), balance, "Seeded record");
        Ok(())
    }

    /// Run `f` in a new transaction on a new connection.
    ///
    /// The transaction is committed if `commit` is set and `f` succeeds,
    /// and discarded otherwise.
    fn with_transaction<R>(
        &self,
        f: impl FnOnce(&BalanceAccessor, &mut <C::Connection as Connection>::Txn) -> Result<R>,
        commit: bool,
    ) -> Result<R> {
        let conn = self
            .connector
            .connect()
            .with_context(|| format!("Unable to connect to {}", self.connector.endpoint()))?;

        let result = conn.begin().context("Unable to begin transaction").and_then(|mut txn| {
            match f(&self.accessor, &mut txn) {
                Ok(value) if commit => txn
                    .commit()
                    .context("Unable to commit transaction")
                    .map(|()| value),
                Ok(value) => txn
                    .discard()
                    .context("Unable to discard transaction")
                    .map(|()| value),
                Err(e) => {
                    if let Err(discard_err) = txn.discard() {
                        warn!(error = %discard_err, "Unable to discard transaction");
                    }
                    Err(e)
                }
            }
        });
        let closed = conn.close().context("Unable to close connection");
        let value = result?;
        closed?;
        Ok(value)
    }
}

/// Driver reaction to a participant signal.
fn react<C: Connector>(ctx: &ScenarioContext<'_, C>, event: &ScenarioEvent) -> Option<ScenarioEvent> {
    match event {
        ScenarioEvent::ReadComplete { participant, .. }
            if ctx.policy().release_mode() == ReleaseMode::FirstRead =>
        {
            if ctx.barrier().release() {
                debug!(participant = %participant, "Driver released barrier");
                return Some(ScenarioEvent::Released {
                    source: ReleaseSource::Driver,
                });
            }
            None
        }
        ScenarioEvent::Failed { participant, .. } => {
            if ctx.barrier().break_barrier(format!("{} failed", participant)) {
                debug!(participant = %participant, "Driver broke barrier");
                return Some(ScenarioEvent::Broken {
                    cause: *participant,
                });
            }
            None
        }
        _ => None,
    }
}
