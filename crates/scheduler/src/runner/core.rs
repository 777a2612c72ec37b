use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::execution::{Execution, ExecutionId, lock};
use crate::guard::StaleGuard;
use crate::metrics::SchedulerMetrics;
use crate::types::{LoadLevel, SchedulerConfig, assess_load};

/// An execution waiting for its turn, together with its driver.
pub(super) struct Queued {
    pub(super) execution: Arc<Execution>,
    /// Lazy driver future; spawned when the execution becomes current.
    pub(super) run: BoxFuture<'static, ()>,
}

pub(super) struct State {
    pub(super) queue: VecDeque<Queued>,
    /// Execution holding the lock, or a nested execution running in its turn.
    pub(super) current: Option<Arc<Execution>>,
    pub(super) next_id: ExecutionId,
}

pub(super) struct Shared {
    pub(super) config: SchedulerConfig,
    pub(super) state: Mutex<State>,
    /// Id of the queued execution that most recently became current; 0 = none yet.
    pub(super) active_id: Arc<AtomicU64>,
    pub(super) metrics: Mutex<SchedulerMetrics>,
    pub(super) runtime: Handle,
}

impl Shared {
    pub(super) fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub(super) fn metrics(&self) -> MutexGuard<'_, SchedulerMetrics> {
        lock(&self.metrics)
    }

    /// Update queue depth and load level, logging load transitions.
    pub(super) fn observe_queue(&self, depth: usize) {
        let level = assess_load(depth, &self.config);
        let previous = {
            let mut m = self.metrics();
            m.queue_depth = depth;
            std::mem::replace(&mut m.current_load_level, level)
        };
        if previous != level {
            match level {
                LoadLevel::Normal => info!(queue_depth = depth, "Scheduler load back to normal"),
                _ => warn!(queue_depth = depth, load = ?level, "Scheduler load raised"),
            }
        }
    }
}

/// The single-concurrency scheduler.
///
/// Runs submitted executions one at a time in submission order. Cloning is
/// cheap and every clone drives the same queue; hand a clone to each
/// collaborator that needs to submit work or make nested invocations.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler that spawns its drivers on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    /// Create a scheduler that spawns its drivers on `runtime`.
    pub fn with_runtime(config: SchedulerConfig, runtime: Handle) -> Self {
        info!(
            default_timeout_ms = config.default_timeout_ms,
            "Scheduler created"
        );
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    current: None,
                    next_id: 1,
                }),
                active_id: Arc::new(AtomicU64::new(0)),
                metrics: Mutex::new(SchedulerMetrics::default()),
                runtime,
            }),
        }
    }

    pub(super) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// True while an execution holds the lock.
    pub fn is_locked(&self) -> bool {
        self.shared.state().current.is_some()
    }

    /// The execution currently receiving dependents, if any.
    pub fn current_execution(&self) -> Option<Arc<Execution>> {
        self.shared.state().current.clone()
    }

    /// Id of the queued execution that most recently became current.
    pub fn active_id(&self) -> Option<ExecutionId> {
        match self.shared.active_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Number of executions waiting for their turn.
    pub fn queued_len(&self) -> usize {
        self.shared.state().queue.len()
    }

    /// Issue a guard bound to the id the next submission will receive.
    pub fn issue_guard(&self) -> StaleGuard {
        let issued_at = self.shared.state().next_id;
        StaleGuard::new(issued_at, Arc::clone(&self.shared.active_id))
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared.metrics().clone()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state();
        f.debug_struct("Scheduler")
            .field("current", &state.current.as_ref().map(|e| e.id()))
            .field("queued", &state.queue.len())
            .field("next_id", &state.next_id)
            .finish()
    }
}
