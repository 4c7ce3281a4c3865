//! Deterministic fault injection for the in-memory store
//!
//! [`FaultInjector`] holds declarative [`FaultSpec`] rules. Each store
//! operation asks the injector whether it should fail; matching is purely
//! count-based, so the same rules always fail the same operations.
//!
//! ```ignore
//! let store = MemoryStore::new();
//! store.inject(FaultSpec::once(Fault::Commit));
//! store.inject(FaultSpec::always(Fault::Discard).after(1));
//! ```

use parking_lot::Mutex;
use tracing::debug;

/// Store operation a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Opening a connection
    Connect,
    /// Running a lookup
    Query,
    /// Running an upsert
    Mutate,
    /// Committing
    Commit,
    /// Discarding
    Discard,
    /// Closing a connection
    Close,
}

impl Fault {
    fn label(&self) -> &'static str {
        match self {
            Fault::Connect => "connect",
            Fault::Query => "query",
            Fault::Mutate => "mutate",
            Fault::Commit => "commit",
            Fault::Discard => "discard",
            Fault::Close => "close",
        }
    }
}

/// Rule describing when a fault fires.
#[derive(Debug, Clone)]
pub struct FaultSpec {
    /// Targeted operation
    pub fault: Fault,
    /// Number of matching operations that pass before the first trigger
    skip: u64,
    /// Maximum triggers; `None` fires on every match after `skip`
    max_triggers: Option<u32>,
    seen: u64,
    triggered: u32,
}

impl FaultSpec {
    /// Fire on the next matching operation only.
    pub fn once(fault: Fault) -> Self {
        Self {
            fault,
            skip: 0,
            max_triggers: Some(1),
            seen: 0,
            triggered: 0,
        }
    }

    /// Fire on every matching operation.
    pub fn always(fault: Fault) -> Self {
        Self {
            fault,
            skip: 0,
            max_triggers: None,
            seen: 0,
            triggered: 0,
        }
    }

    /// Let the first `n` matching operations pass.
    pub fn after(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    fn exhausted(&self) -> bool {
        matches!(self.max_triggers, Some(max) if self.triggered >= max)
    }

    fn matches(&mut self, fault: Fault) -> bool {
        if self.fault != fault || self.exhausted() {
            return false;
        }
        self.seen += 1;
        if self.seen <= self.skip {
            return false;
        }
        self.triggered += 1;
        true
    }
}

/// A fault that actually fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultTriggerRecord {
    /// Index of the rule that fired
    pub spec_index: usize,
    /// Operation that failed
    pub fault: Fault,
}

/// Registry of armed faults.
#[derive(Debug, Default)]
pub struct FaultInjector {
    specs: Mutex<Vec<FaultSpec>>,
    log: Mutex<Vec<FaultTriggerRecord>>,
}

impl FaultInjector {
    /// Create an injector with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a rule.
    pub fn inject(&self, spec: FaultSpec) {
        self.specs.lock().push(spec);
    }

    /// Remove all rules. The trigger log is kept.
    pub fn clear(&self) {
        self.specs.lock().clear();
    }

    /// Returns the failure message if `fault` should fire now.
    pub fn check(&self, fault: Fault) -> Option<String> {
        let mut specs = self.specs.lock();
        let index = specs.iter_mut().position(|spec| spec.matches(fault))?;
        drop(specs);

        debug!(fault = fault.label(), spec_index = index, "Injected fault");
        self.log.lock().push(FaultTriggerRecord {
            spec_index: index,
            fault,
        });
        Some(format!("injected {} fault", fault.label()))
    }

    /// Faults fired so far, in order.
    pub fn triggered(&self) -> Vec<FaultTriggerRecord> {
        self.log.lock().clone()
    }
}
