//! Expected-count rendezvous
//!
//! [`Rendezvous`] holds participants at a checkpoint until a fixed quota
//! has arrived, then lets all of them through at once.
//!
//! ## State Machine
//!
//! ```text
//!            arrive() < quota           arrive() == quota | release()
//!   Open ───────────────────► Waiting ─────────────────────────────► Released
//!     │                          │
//!     └──── break_barrier() ─────┴────────────────────────────────► Broken
//! ```
//!
//! `Released` and `Broken` are terminal until an explicit [`Rendezvous::reset`].
//! A released barrier stays released: later arrivals are counted and pass
//! straight through. Arrivals are never counted beyond the quota.
//!
//! A barrier that nobody releases, breaks, or fills blocks its waiters
//! forever; there is no timeout.

use parking_lot::{Condvar, Mutex};
use tracing::debug;
use walletrace_core::{Error, Result};

/// Observable state of a [`Rendezvous`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Nobody has arrived yet
    Open,
    /// At least one participant is waiting
    Waiting,
    /// Everybody may proceed
    Released,
    /// Waiters were told to give up
    Broken,
}

/// Receipt for a successful arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    /// 1-based arrival order
    pub position: usize,
    /// Whether this arrival had to block
    pub waited: bool,
    /// Whether this arrival filled the quota and released the others
    pub released_quota: bool,
}

#[derive(Debug)]
struct Inner {
    arrivals: usize,
    state: BarrierState,
    broken_reason: Option<String>,
}

/// Reusable-on-reset rendezvous for a fixed number of participants
#[derive(Debug)]
pub struct Rendezvous {
    expected: usize,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Rendezvous {
    /// Create a barrier for `expected` participants.
    ///
    /// A quota of zero is treated as one, as `std::sync::Barrier` does.
    pub fn new(expected: usize) -> Self {
        Self {
            expected: expected.max(1),
            inner: Mutex::new(Inner {
                arrivals: 0,
                state: BarrierState::Open,
                broken_reason: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Quota of participants.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Arrivals counted so far.
    pub fn arrivals(&self) -> usize {
        self.inner.lock().arrivals
    }

    /// Current state.
    pub fn state(&self) -> BarrierState {
        self.inner.lock().state
    }

    /// Whether the barrier has been released.
    pub fn is_released(&self) -> bool {
        self.state() == BarrierState::Released
    }

    /// Count an arrival and block until the barrier is released.
    ///
    /// The arrival that fills the quota releases every waiter and returns
    /// without blocking. Arrivals after release return immediately.
    ///
    /// # Errors
    ///
    /// - `BarrierBroken` if the barrier is or becomes broken
    /// - `InvalidState` if the quota has already been reached
    pub fn arrive(&self) -> Result<Arrival> {
        self.arrive_with(|| {})
    }

    /// Same as [`arrive`](Self::arrive), running `on_quota` if this arrival
    /// fills the quota.
    ///
    /// `on_quota` runs under the barrier's lock before any waiter is woken,
    /// so whatever it records happens before the released participants
    /// resume. It must not touch the barrier.
    pub fn arrive_with(&self, on_quota: impl FnOnce()) -> Result<Arrival> {
        let mut inner = self.inner.lock();

        if inner.state == BarrierState::Broken {
            return Err(broken(&inner));
        }
        if inner.arrivals >= self.expected {
            return Err(Error::InvalidState(format!(
                "rendezvous quota of {} already reached",
                self.expected
            )));
        }

        inner.arrivals += 1;
        let position = inner.arrivals;

        if inner.state == BarrierState::Released {
            return Ok(Arrival {
                position,
                waited: false,
                released_quota: false,
            });
        }

        if position == self.expected {
            inner.state = BarrierState::Released;
            on_quota();
            self.cond.notify_all();
            debug!(position, expected = self.expected, "Rendezvous quota reached");
            return Ok(Arrival {
                position,
                waited: false,
                released_quota: true,
            });
        }

        inner.state = BarrierState::Waiting;
        debug!(position, expected = self.expected, "Waiting at rendezvous");
        loop {
            match inner.state {
                BarrierState::Released => {
                    return Ok(Arrival {
                        position,
                        waited: true,
                        released_quota: false,
                    })
                }
                BarrierState::Broken => return Err(broken(&inner)),
                BarrierState::Open | BarrierState::Waiting => self.cond.wait(&mut inner),
            }
        }
    }

    /// Release every waiter regardless of the arrival count.
    ///
    /// Returns `true` if this call performed the transition; releasing an
    /// already released or broken barrier does nothing.
    pub fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BarrierState::Released | BarrierState::Broken => false,
            BarrierState::Open | BarrierState::Waiting => {
                inner.state = BarrierState::Released;
                self.cond.notify_all();
                debug!(arrivals = inner.arrivals, "Rendezvous released externally");
                true
            }
        }
    }

    /// Wake every waiter with `BarrierBroken` and refuse later arrivals.
    ///
    /// Returns `true` if this call performed the transition. A released
    /// barrier cannot be broken.
    pub fn break_barrier(&self, reason: impl Into<String>) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BarrierState::Released | BarrierState::Broken => false,
            BarrierState::Open | BarrierState::Waiting => {
                let reason = reason.into();
                debug!(arrivals = inner.arrivals, reason = %reason, "Rendezvous broken");
                inner.state = BarrierState::Broken;
                inner.broken_reason = Some(reason);
                self.cond.notify_all();
                true
            }
        }
    }

    /// Return to `Open` with no arrivals.
    ///
    /// # Errors
    ///
    /// `InvalidState` while participants are waiting.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == BarrierState::Waiting {
            return Err(Error::InvalidState(
                "cannot reset a rendezvous with waiting participants".to_string(),
            ));
        }
        inner.arrivals = 0;
        inner.state = BarrierState::Open;
        inner.broken_reason = None;
        Ok(())
    }
}

fn broken(inner: &Inner) -> Error {
    Error::BarrierBroken(
        inner
            .broken_reason
            .clone()
            .unwrap_or_else(|| "rendezvous broken".to_string()),
    )
}
