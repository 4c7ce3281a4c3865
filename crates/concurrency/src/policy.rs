//! Lock policy for a participant's read-modify-write
//!
//! The two strategies differ only in whether an [`ExclusiveLock`] is held
//! across the whole transaction:
//!
//! | Policy | Lock | Barrier released by | Outcome |
//! |--------|------|---------------------|---------|
//! | Unlocked | none | quota of arrivals | both reads precede both writes; one update is lost |
//! | Serialized | whole transaction | driver, on first read | each read sees the previous commit |
//!
//! Under `Serialized` a peer blocked on the lock can never join the lock
//! holder at the barrier, so the barrier's own quota would never fill. The
//! driver releases it instead.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;
use walletrace_core::{Error, ParticipantId};

/// Concurrency-control strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// No lock; exposes the lost update
    Unlocked,
    /// Exclusive lock around begin, read, barrier, write and commit
    #[default]
    Serialized,
}

/// Who opens the barrier under a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// The arrival that fills the quota
    Quota,
    /// The driver, as soon as one participant reports its read
    FirstRead,
}

impl LockPolicy {
    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            LockPolicy::Unlocked => "unlocked",
            LockPolicy::Serialized => "serialized",
        }
    }

    /// Barrier release mechanism used with this policy.
    pub fn release_mode(&self) -> ReleaseMode {
        match self {
            LockPolicy::Unlocked => ReleaseMode::Quota,
            LockPolicy::Serialized => ReleaseMode::FirstRead,
        }
    }

    /// Acquire `lock` if this policy requires it.
    ///
    /// Blocks while another participant holds the lock. The returned guard,
    /// if any, must live until the participant's transaction is finished.
    pub fn enter<'a>(
        &self,
        lock: &'a ExclusiveLock,
        participant: ParticipantId,
    ) -> Option<ExclusiveGuard<'a>> {
        match self {
            LockPolicy::Unlocked => None,
            LockPolicy::Serialized => Some(lock.acquire(participant)),
        }
    }
}

impl std::fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlocked" | "v1" => Ok(LockPolicy::Unlocked),
            "serialized" | "v2" => Ok(LockPolicy::Serialized),
            other => Err(Error::InvalidState(format!(
                "unknown lock policy {:?} (expected \"unlocked\" or \"serialized\")",
                other
            ))),
        }
    }
}

/// Process-wide exclusive lock shared by the participants of a scenario
#[derive(Debug, Default)]
pub struct ExclusiveLock {
    mutex: Mutex<()>,
    holder: Mutex<Option<ParticipantId>>,
}

impl ExclusiveLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then take it.
    pub fn acquire(&self, participant: ParticipantId) -> ExclusiveGuard<'_> {
        let guard = self.mutex.lock();
        *self.holder.lock() = Some(participant);
        debug!(%participant, "Acquired exclusive lock");
        ExclusiveGuard {
            lock: self,
            participant,
            _guard: guard,
        }
    }

    /// Whether someone holds the lock.
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    /// Participant currently holding the lock.
    pub fn holder(&self) -> Option<ParticipantId> {
        *self.holder.lock()
    }
}

/// Held exclusive lock; released on drop
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    lock: &'a ExclusiveLock,
    participant: ParticipantId,
    _guard: MutexGuard<'a, ()>,
}

impl ExclusiveGuard<'_> {
    /// Participant holding the lock.
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        // Cleared before the mutex guard field drops
        *self.lock.holder.lock() = None;
        debug!(participant = %self.participant, "Released exclusive lock");
    }
}
