//! Scenario report
//!
//! The driver records every coordination step it observes, in the order it
//! observes them, so callers can check the interleaving a run produced as
//! well as its final balance.

use chrono::{DateTime, Utc};
use serde::Serialize;
use walletrace_concurrency::LockPolicy;
use walletrace_core::{Balance, ParticipantId, ScenarioId};

/// Tolerance used when comparing balances.
const BALANCE_EPSILON: f64 = 1e-9;

/// Who opened the barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseSource {
    /// The participant whose arrival filled the quota
    Quota(ParticipantId),
    /// The driver, after a participant reported its read
    Driver,
}

/// One coordination step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Participant finished its read
    ReadComplete {
        /// Reader
        participant: ParticipantId,
        /// Balance it observed
        observed: Balance,
    },
    /// Barrier opened
    Released {
        /// Who opened it
        source: ReleaseSource,
    },
    /// Participant committed its write
    Committed {
        /// Writer
        participant: ParticipantId,
        /// Balance it wrote
        balance: Balance,
    },
    /// Participant failed; its transaction was discarded
    Failed {
        /// Failed participant
        participant: ParticipantId,
        /// Rendered error
        error: String,
    },
    /// Barrier broken by the driver after a failure
    Broken {
        /// Participant whose failure broke it
        cause: ParticipantId,
    },
}

/// A [`ScenarioEvent`] with the time the driver observed it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEvent {
    /// Observation time
    pub at: DateTime<Utc>,
    /// The event
    #[serde(flatten)]
    pub event: ScenarioEvent,
}

/// Result of one participant's read-modify-write
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticipantOutcome {
    /// Participant
    pub participant: ParticipantId,
    /// Increment applied
    pub delta: Balance,
    /// Balance read
    pub observed: Balance,
    /// Balance written (`observed + delta`)
    pub computed: Balance,
}

/// Everything a successful scenario run produced
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Run identifier
    pub id: ScenarioId,
    /// Strategy used
    pub policy: LockPolicy,
    /// Per-participant outcomes, in participant order
    pub outcomes: Vec<ParticipantOutcome>,
    /// Coordination steps in observation order
    pub events: Vec<TimedEvent>,
    /// Committed balance after all participants finished
    pub final_balance: Option<Balance>,
}

impl ScenarioReport {
    /// Empty report for a run.
    pub fn new(id: ScenarioId, policy: LockPolicy) -> Self {
        Self {
            id,
            policy,
            outcomes: Vec::new(),
            events: Vec::new(),
            final_balance: None,
        }
    }

    /// Append an event stamped with the current time.
    pub fn record(&mut self, event: ScenarioEvent) {
        self.events.push(TimedEvent {
            at: Utc::now(),
            event,
        });
    }

    /// Balance observed by the first read.
    pub fn initial_balance(&self) -> Option<Balance> {
        self.events.iter().find_map(|e| match e.event {
            ScenarioEvent::ReadComplete { observed, .. } => Some(observed),
            _ => None,
        })
    }

    /// Sum of all participants' deltas.
    pub fn total_delta(&self) -> Balance {
        self.outcomes.iter().map(|o| o.delta).sum()
    }

    /// Balance a fully serialized run would end at.
    pub fn expected_serial_balance(&self) -> Option<Balance> {
        self.initial_balance().map(|initial| initial + self.total_delta())
    }

    /// Whether some participant's update was overwritten.
    pub fn lost_update(&self) -> bool {
        match (self.final_balance, self.expected_serial_balance()) {
            (Some(actual), Some(expected)) => !balances_equal(actual, expected),
            _ => false,
        }
    }

    /// Participants in the order their reads were observed.
    pub fn read_order(&self) -> Vec<ParticipantId> {
        self.events
            .iter()
            .filter_map(|e| match e.event {
                ScenarioEvent::ReadComplete { participant, .. } => Some(participant),
                _ => None,
            })
            .collect()
    }

    /// Participants in the order their commits were observed.
    pub fn commit_order(&self) -> Vec<ParticipantId> {
        self.events
            .iter()
            .filter_map(|e| match e.event {
                ScenarioEvent::Committed { participant, .. } => Some(participant),
                _ => None,
            })
            .collect()
    }

    /// Whether every read was observed before the first commit.
    pub fn reads_before_writes(&self) -> bool {
        let first_commit = self
            .events
            .iter()
            .position(|e| matches!(e.event, ScenarioEvent::Committed { .. }));
        let last_read = self
            .events
            .iter()
            .rposition(|e| matches!(e.event, ScenarioEvent::ReadComplete { .. }));
        match (last_read, first_commit) {
            (Some(read), Some(commit)) => read < commit,
            _ => true,
        }
    }

    /// Who opened the barrier, if anyone did.
    pub fn release_source(&self) -> Option<ReleaseSource> {
        self.events.iter().find_map(|e| match e.event {
            ScenarioEvent::Released { source } => Some(source),
            _ => None,
        })
    }

    /// Outcome of one participant.
    pub fn outcome(&self, participant: ParticipantId) -> Option<&ParticipantOutcome> {
        self.outcomes.iter().find(|o| o.participant == participant)
    }
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "scenario {} ({})", self.id, self.policy)?;
        for outcome in &self.outcomes {
            writeln!(
                f,
                "  {}: read {} + {} -> wrote {}",
                outcome.participant, outcome.observed, outcome.delta, outcome.computed
            )?;
        }
        match self.final_balance {
            Some(balance) => write!(f, "  final balance: {}", balance)?,
            None => write!(f, "  final balance: unknown")?,
        }
        if let Some(expected) = self.expected_serial_balance() {
            write!(f, " (serial result {})", expected)?;
        }
        if self.lost_update() {
            write!(f, " LOST UPDATE")?;
        }
        Ok(())
    }
}

/// Equality within [`BALANCE_EPSILON`].
pub fn balances_equal(a: Balance, b: Balance) -> bool {
    (a - b).abs() <= BALANCE_EPSILON
}
