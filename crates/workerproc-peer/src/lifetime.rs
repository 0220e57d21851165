use std::sync::{Arc, Condvar, Mutex};

use crate::error::WorkerError;

/// Terminal outcome of a worker: Ok for a clean exit, Err otherwise.
///
/// The error is shared because the supervisor thread and any number of
/// waiters all observe the same terminal value.
pub type LifetimeOutcome = Result<(), Arc<WorkerError>>;

/// One-shot completion cell for a worker's terminal outcome.
///
/// Resolved exactly once; later resolutions are dropped, so the first
/// error always wins.
pub struct Lifetime {
    outcome: Mutex<Option<LifetimeOutcome>>,
    cond: Condvar,
}

impl Lifetime {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Resolve the lifetime. Returns false if it was already resolved.
    pub fn resolve(&self, outcome: LifetimeOutcome) -> bool {
        let mut slot = self.outcome.lock().expect("lifetime cell poisoned");
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.cond.notify_all();
        true
    }

    /// Block until the lifetime resolves.
    pub fn wait(&self) -> LifetimeOutcome {
        let mut slot = self.outcome.lock().expect("lifetime cell poisoned");
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.cond.wait(slot).expect("lifetime cell poisoned");
        }
    }

    /// The outcome if already resolved, without blocking.
    pub fn poll(&self) -> Option<LifetimeOutcome> {
        self.outcome
            .lock()
            .expect("lifetime cell poisoned")
            .clone()
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}
