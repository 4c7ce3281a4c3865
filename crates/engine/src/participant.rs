//! One concurrent read-modify-write
//!
//! # Sequence
//!
//! ```text
//! 1. Enter policy        → acquire the exclusive lock under Serialized
//! 2. Connect, begin      → fresh connection and transaction
//! 3. Read                → observed balance, ReadComplete signal
//! 4. Arrive at barrier   → block until released (or broken)
//! 5. Write               → stage observed + delta
//! 6. Commit              → Committed signal, still under the lock
//! 7. Close               → connection closed whatever happened above
//! ```
//!
//! Any failure in steps 3-6 discards the transaction. A failed discard is
//! logged and attached to the primary error as context. The lock guard is
//! dropped only after the participant's last signal has been sent, so the
//! driver observes serialized participants in lock order.

use std::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use walletrace_core::{
    Balance, Connection, Connector, Error, ParticipantId, Result, ResultExt, Transaction,
};

use crate::report::{ParticipantOutcome, ReleaseSource, ScenarioEvent};
use crate::scenario::ScenarioContext;

/// A worker applying `delta` to the shared record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Participant {
    id: ParticipantId,
    delta: Balance,
}

impl Participant {
    /// Participant `id` adding `delta`.
    pub fn new(id: ParticipantId, delta: Balance) -> Self {
        Self { id, delta }
    }

    /// Identifier.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Increment applied.
    pub fn delta(&self) -> Balance {
        self.delta
    }

    /// Perform the read-modify-write, reporting progress on `events`.
    ///
    /// On failure a [`ScenarioEvent::Failed`] is sent before returning.
    /// Send errors are ignored: a driver that stopped listening does not
    /// change the outcome of the transaction.
    pub fn run<C: Connector>(
        &self,
        ctx: &ScenarioContext<'_, C>,
        events: &Sender<ScenarioEvent>,
    ) -> Result<ParticipantOutcome> {
        let _guard = ctx.policy().enter(ctx.lock(), self.id);
        debug!(participant = %self.id, delta = self.delta, "Participant started");

        let result = self.connect_and_transact(ctx, events);
        if let Err(e) = &result {
            error!(participant = %self.id, delta = self.delta, error = %e, "Participant failed");
            let _ = events.send(ScenarioEvent::Failed {
                participant: self.id,
                error: e.to_string(),
            });
        }
        result
    }

    fn connect_and_transact<C: Connector>(
        &self,
        ctx: &ScenarioContext<'_, C>,
        events: &Sender<ScenarioEvent>,
    ) -> Result<ParticipantOutcome> {
        let connector = ctx.connector();
        let conn = connector
            .connect()
            .with_context(|| format!("Unable to connect to {}", connector.endpoint()))?;

        let result = conn
            .begin()
            .context("Unable to begin transaction")
            .and_then(|txn| self.transact(ctx, txn, events));
        let closed = conn.close().context("Unable to close connection");

        match (result, closed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(participant = %self.id, error = %close_err, "Close failed after earlier error");
                Err(e)
            }
        }
    }

    fn transact<C: Connector, T: Transaction>(
        &self,
        ctx: &ScenarioContext<'_, C>,
        mut txn: T,
        events: &Sender<ScenarioEvent>,
    ) -> Result<ParticipantOutcome> {
        let outcome = match self.read_modify_write(ctx, &mut txn, events) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.abandon(txn, e)),
        };

        txn.commit().context("Unable to commit transaction")?;
        info!(
            participant = %self.id,
            balance = outcome.computed,
            "New balance is {}",
            outcome.computed
        );
        let _ = events.send(ScenarioEvent::Committed {
            participant: self.id,
            balance: outcome.computed,
        });
        Ok(outcome)
    }

    fn read_modify_write<C: Connector, T: Transaction>(
        &self,
        ctx: &ScenarioContext<'_, C>,
        txn: &mut T,
        events: &Sender<ScenarioEvent>,
    ) -> Result<ParticipantOutcome> {
        let accessor = ctx.accessor();
        let observed = accessor.read_balance(txn)?;
        info!(participant = %self.id, balance = observed, "Current balance is {}", observed);
        let _ = events.send(ScenarioEvent::ReadComplete {
            participant: self.id,
            observed,
        });

        // Released is sent before the barrier wakes anyone, so it precedes
        // every post-barrier event in the log
        let arrival = ctx
            .barrier()
            .arrive_with(|| {
                let _ = events.send(ScenarioEvent::Released {
                    source: ReleaseSource::Quota(self.id),
                });
            })
            .with_context(|| format!("{} abandoned at barrier", self.id))?;
        debug!(
            participant = %self.id,
            position = arrival.position,
            waited = arrival.waited,
            "Passed barrier"
        );

        let computed = observed + self.delta;
        accessor.write_balance(txn, computed)?;

        Ok(ParticipantOutcome {
            participant: self.id,
            delta: self.delta,
            observed,
            computed,
        })
    }

    /// Discard `txn` after `cause`; returns the error to report.
    fn abandon<T: Transaction>(&self, txn: T, cause: Error) -> Error {
        warn!(participant = %self.id, error = %cause, "Discarding transaction");
        match txn.discard() {
            Ok(()) => cause,
            Err(discard_err) => {
                error!(participant = %self.id, error = %discard_err, "Unable to discard transaction");
                cause.context(format!("transaction discard also failed ({})", discard_err))
            }
        }
    }
}
