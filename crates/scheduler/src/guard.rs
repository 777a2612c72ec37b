use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ExecutionError;
use crate::execution::ExecutionId;

/// Predicate telling a long-lived continuation whether the scheduler has
/// moved past the point where the guard was issued.
///
/// Issued with the id the next submission will receive. It turns stale once a
/// queued execution with a higher id becomes current, and never turns back.
/// Check it before writing shared state from code that may outlive its turn
/// (for example after the turn timed out).
#[derive(Debug, Clone)]
pub struct StaleGuard {
    issued_at: ExecutionId,
    active: Arc<AtomicU64>,
}

impl StaleGuard {
    pub(crate) fn new(issued_at: ExecutionId, active: Arc<AtomicU64>) -> Self {
        Self { issued_at, active }
    }

    pub fn issued_at(&self) -> ExecutionId {
        self.issued_at
    }

    pub fn is_stale(&self) -> bool {
        self.active.load(Ordering::Acquire) > self.issued_at
    }

    /// `Err(Superseded)` once stale, for early exits with `?`.
    pub fn ensure_fresh(&self) -> Result<(), ExecutionError> {
        let active = self.active.load(Ordering::Acquire);
        if active > self.issued_at {
            Err(ExecutionError::Superseded {
                issued_at: self.issued_at,
                active,
            })
        } else {
            Ok(())
        }
    }
}
