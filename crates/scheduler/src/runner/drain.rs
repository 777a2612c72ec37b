use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::execution::{Execution, ExecutionHandle, ExecutionId};
use crate::task::{Operation, Task};

use super::core::{Queued, Shared};
use super::Scheduler;

tokio::task_local! {
    /// Execution whose operation is running on this task. Nested invocations
    /// join it, whatever the scheduler's `current` slot points at.
    pub(super) static ENCLOSING: Arc<Execution>;
}

/// What the driver does once the outcome is known.
pub(super) enum Completion {
    /// A queued execution: release the lock and drain the next one.
    Release,
    /// A nested execution: hand `current` back to the enclosing execution and
    /// report to its dependent join.
    Nested {
        parent: Arc<Execution>,
        dependent: oneshot::Sender<Result<(), ExecutionError>>,
    },
}

impl Scheduler {
    /// Submit an operation with an explicit timeout (`Duration::ZERO` = none).
    ///
    /// Returns immediately; the handle settles after the execution's turn.
    pub fn submit<T, F, Fut>(&self, operation: F, timeout: Duration) -> ExecutionHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit_task(Task::new(operation).with_timeout(timeout))
    }

    /// Submit a task. Tasks without a timeout get the configured default.
    pub fn submit_task<T: Send + 'static>(&self, task: Task<T>) -> ExecutionHandle<T> {
        let (operation, timeout, label) = task.into_parts();
        self.enqueue(move |_| operation, timeout, label)
    }

    /// Lock the scheduler without running anything: queue an execution that
    /// only settles, with `Ok(())`, when released by [`finish_current`].
    /// It never times out.
    ///
    /// [`finish_current`]: Scheduler::finish_current
    pub fn hold(&self) -> ExecutionHandle<()> {
        self.enqueue(
            |execution| -> Operation<()> {
                let execution = Arc::clone(execution);
                Box::new(move || {
                    async move {
                        execution.released().await;
                        Ok::<_, anyhow::Error>(())
                    }
                    .boxed()
                })
            },
            Some(Duration::ZERO),
            Some("hold".to_string()),
        )
    }

    fn enqueue<T, B>(
        &self,
        build: B,
        timeout: Option<Duration>,
        label: Option<String>,
    ) -> ExecutionHandle<T>
    where
        T: Send + 'static,
        B: FnOnce(&Arc<Execution>) -> Operation<T>,
    {
        let timeout = self.shared.config.resolve_timeout(timeout);
        let (tx, rx) = oneshot::channel();
        let (id, depth) = {
            let mut state = self.shared.state();
            let id = state.next_id;
            state.next_id += 1;
            let execution = Arc::new(Execution::new(id, timeout, label, None));
            let operation = build(&execution);
            let run = Box::pin(drive(
                Arc::downgrade(&self.shared),
                Arc::clone(&execution),
                operation,
                tx,
                Completion::Release,
            ));
            state.queue.push_back(Queued { execution, run });
            (id, state.queue.len())
        };
        debug!(id, queued = depth, ?timeout, "Execution submitted");
        self.shared.metrics().submitted += 1;
        self.shared.observe_queue(depth);
        self.drain();
        ExecutionHandle::new(Some(id), rx)
    }

    /// Start the head of the queue if nothing holds the lock.
    pub(super) fn drain(&self) {
        let (next, depth) = {
            let mut state = self.shared.state();
            if state.current.is_some() {
                return;
            }
            let Some(next) = state.queue.pop_front() else {
                return;
            };
            state.current = Some(Arc::clone(&next.execution));
            self.shared
                .active_id
                .store(next.execution.id(), Ordering::Release);
            (next, state.queue.len())
        };
        debug!(
            id = next.execution.id(),
            name = %next.execution.display_name(),
            queued = depth,
            "Execution became current"
        );
        self.shared.observe_queue(depth);
        self.shared.runtime.spawn(next.run);
    }

    /// Release the lock held by the queued execution `id` and drain the next
    /// one. No-op if that turn was already released with `finish_current`.
    pub(super) fn release(&self, id: ExecutionId) {
        {
            let mut state = self.shared.state();
            match &state.current {
                Some(current) if current.root_id() == id => state.current = None,
                _ => {
                    debug!(id, "Turn already released");
                    return;
                }
            }
        }
        self.drain();
    }

    /// Explicitly release the current turn and drain the next execution.
    ///
    /// For work whose completion is signaled from outside rather than by its
    /// operation returning. The released execution keeps running and still
    /// delivers its outcome, but no longer holds the lock.
    pub fn finish_current(&self) {
        let released = self.shared.state().current.take();
        match released {
            Some(execution) => {
                let root = root_of(&execution);
                info!(id = root.id(), "Current execution released explicitly");
                root.notify_released();
                self.shared.metrics().forced_releases += 1;
            }
            None => debug!("finish_current called while unlocked"),
        }
        self.drain();
    }

    /// Put `parent` back as current if `nested` still is.
    pub(super) fn restore(&self, nested: &Execution, parent: &Arc<Execution>) {
        let mut state = self.shared.state();
        if state
            .current
            .as_ref()
            .is_some_and(|current| current.id() == nested.id())
        {
            state.current = Some(Arc::clone(parent));
        }
    }
}

fn root_of(execution: &Arc<Execution>) -> Arc<Execution> {
    let mut root = Arc::clone(execution);
    while let Some(parent) = root.parent().cloned() {
        root = parent;
    }
    root
}

/// Run one execution: race the operation against its timeout, join its
/// dependents, deliver the outcome, then complete the turn.
pub(super) async fn drive<T: Send + 'static>(
    shared: Weak<Shared>,
    execution: Arc<Execution>,
    operation: Operation<T>,
    outcome_tx: oneshot::Sender<Result<T, ExecutionError>>,
    completion: Completion,
) {
    let started = Instant::now();
    let timeout = execution.timeout();

    // Spawned so the operation keeps running if it loses the race.
    let mut in_flight = tokio::spawn(ENCLOSING.scope(Arc::clone(&execution), async move {
        operation().await
    }));
    let raced = if timeout.is_zero() {
        settle(in_flight.await)
    } else {
        let timer = tokio::time::sleep(timeout);
        tokio::select! {
            biased;
            joined = &mut in_flight => settle(joined),
            _ = timer => Err(ExecutionError::TimeoutExceeded(timeout)),
        }
    };

    let joined = execution.join_dependents().await;
    let outcome = match (raced, joined) {
        (Err(e), _) => Err(e),
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(dependent)) => Err(ExecutionError::DependentFailed(dependent.reason())),
    };

    report(&shared, &execution, outcome.as_ref().err(), started.elapsed());

    match completion {
        Completion::Release => {
            let _ = outcome_tx.send(outcome);
            if let Some(shared) = shared.upgrade() {
                Scheduler::from_shared(shared).release(execution.id());
            }
        }
        Completion::Nested { parent, dependent } => {
            if let Some(shared) = shared.upgrade() {
                Scheduler::from_shared(shared).restore(&execution, &parent);
            }
            let _ = dependent.send(outcome.as_ref().map(|_| ()).map_err(Clone::clone));
            let _ = outcome_tx.send(outcome);
        }
    }
}

pub(super) fn settle<T>(
    joined: Result<anyhow::Result<T>, tokio::task::JoinError>,
) -> Result<T, ExecutionError> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ExecutionError::from_operation(e)),
        Err(e) => Err(ExecutionError::from_join(e)),
    }
}

/// Diagnostic sink: every failure is logged whether or not anyone awaits it.
fn report(
    shared: &Weak<Shared>,
    execution: &Execution,
    failure: Option<&ExecutionError>,
    elapsed: Duration,
) {
    let id = execution.id();
    let name = execution.display_name();
    match failure {
        None => debug!(id, %name, ?elapsed, "Execution settled"),
        Some(e) if e.is_timeout() => info!(id, %name, error = %e, "Execution timed out"),
        Some(e) => warn!(id, %name, error = %e, "Execution failed"),
    }
    if let Some(shared) = shared.upgrade() {
        shared.metrics().record_settled(failure, elapsed);
    }
}
