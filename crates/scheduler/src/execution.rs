use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Notify, oneshot};

use crate::error::ExecutionError;

/// Identity of an execution. Assigned at submission, starting at 1.
pub type ExecutionId = u64;

/// Settlement signal of one dependent, as seen by the execution joining on it.
pub(crate) type DependentSignal = oneshot::Receiver<Result<(), ExecutionError>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct DependentSet {
    pending: Vec<DependentSignal>,
    /// Set once the final join found nothing pending; no registration after that.
    sealed: bool,
}

/// Bookkeeping for one unit of scheduled work.
///
/// The operation itself lives in the scheduler's driver; this record carries
/// what collaborators may inspect while it runs.
#[derive(Debug)]
pub struct Execution {
    id: ExecutionId,
    timeout: Duration,
    label: Option<String>,
    /// Enclosing execution when this one was started through the nested bridge.
    parent: Option<Arc<Execution>>,
    dependents: Mutex<DependentSet>,
    released: Notify,
}

impl Execution {
    pub(crate) fn new(
        id: ExecutionId,
        timeout: Duration,
        label: Option<String>,
        parent: Option<Arc<Execution>>,
    ) -> Self {
        Self {
            id,
            timeout,
            label,
            parent,
            dependents: Mutex::new(DependentSet::default()),
            released: Notify::new(),
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Timeout raced against the operation; zero means none.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => format!("{}#{}", label, self.id),
            None => format!("#{}", self.id),
        }
    }

    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    pub fn parent(&self) -> Option<&Arc<Execution>> {
        self.parent.as_ref()
    }

    /// Id of the queued execution whose turn this one runs in.
    pub fn root_id(&self) -> ExecutionId {
        let mut execution = self;
        while let Some(parent) = &execution.parent {
            execution = parent;
        }
        execution.id
    }

    /// Number of dependents registered and not yet collected by a join.
    pub fn pending_dependents(&self) -> usize {
        lock(&self.dependents).pending.len()
    }

    /// Register a dependent. Returns `false` if the execution already finished
    /// joining, in which case the dependent is not tracked.
    pub(crate) fn register_dependent(&self, signal: DependentSignal) -> bool {
        let mut set = lock(&self.dependents);
        if set.sealed {
            return false;
        }
        set.pending.push(signal);
        true
    }

    /// Take everything pending, or seal the set when nothing is.
    fn take_or_seal(&self) -> Vec<DependentSignal> {
        let mut set = lock(&self.dependents);
        if set.pending.is_empty() {
            set.sealed = true;
        }
        std::mem::take(&mut set.pending)
    }

    /// Wait until every dependent, including ones registered while waiting,
    /// has settled. Reports the first failure in settlement order.
    pub(crate) async fn join_dependents(&self) -> Result<(), ExecutionError> {
        let mut first_failure = None;
        loop {
            let batch = self.take_or_seal();
            if batch.is_empty() {
                break;
            }
            let mut pending: FuturesUnordered<DependentSignal> = batch.into_iter().collect();
            while let Some(settled) = pending.next().await {
                if let Err(e) = settled.unwrap_or(Err(ExecutionError::Dropped)) {
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Signal an explicit release of this execution's turn.
    pub(crate) fn notify_released(&self) {
        self.released.notify_one();
    }

    /// Resolves once the turn has been released with `finish_current`.
    pub(crate) async fn released(&self) {
        self.released.notified().await;
    }
}

/// Future-like handle to the outcome of a submitted execution or nested
/// invocation. Settles exactly once.
///
/// Dropping the handle does not cancel anything: the execution still runs and
/// its failures still reach the log.
#[derive(Debug)]
pub struct ExecutionHandle<T> {
    id: Option<ExecutionId>,
    outcome: oneshot::Receiver<Result<T, ExecutionError>>,
}

impl<T> ExecutionHandle<T> {
    pub(crate) fn new(
        id: Option<ExecutionId>,
        outcome: oneshot::Receiver<Result<T, ExecutionError>>,
    ) -> Self {
        Self { id, outcome }
    }

    /// Handle that is already settled with `err`.
    pub(crate) fn failed(err: ExecutionError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(None, rx)
    }

    /// Id of the execution behind this handle. `None` for plain nested calls,
    /// which are tracked without an execution of their own.
    pub fn id(&self) -> Option<ExecutionId> {
        self.id
    }
}

impl<T> Future for ExecutionHandle<T> {
    type Output = Result<T, ExecutionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ExecutionError::Dropped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(id: ExecutionId) -> Execution {
        Execution::new(id, Duration::ZERO, None, None)
    }

    #[test]
    fn root_id_walks_parents() {
        let root = Arc::new(execution(3));
        let child = Arc::new(Execution::new(7, Duration::ZERO, None, Some(Arc::clone(&root))));
        let grandchild = Execution::new(9, Duration::ZERO, Some("leaf".into()), Some(child));
        assert_eq!(grandchild.root_id(), 3);
        assert!(grandchild.is_nested());
        assert!(!root.is_nested());
        assert_eq!(grandchild.display_name(), "leaf#9");
        assert_eq!(root.display_name(), "#3");
    }

    #[tokio::test]
    async fn join_without_dependents_seals() {
        let exec = execution(1);
        assert_eq!(exec.join_dependents().await, Ok(()));
        let (_tx, rx) = oneshot::channel();
        assert!(!exec.register_dependent(rx));
    }

    #[tokio::test]
    async fn join_reports_first_settled_failure() {
        let exec = execution(1);
        let (ok_tx, ok_rx) = oneshot::channel();
        let (late_tx, late_rx) = oneshot::channel();
        let (early_tx, early_rx) = oneshot::channel();
        assert!(exec.register_dependent(ok_rx));
        assert!(exec.register_dependent(late_rx));
        assert!(exec.register_dependent(early_rx));
        assert_eq!(exec.pending_dependents(), 3);

        early_tx.send(Err(ExecutionError::OperationFailed("early".into()))).unwrap();
        ok_tx.send(Ok(())).unwrap();
        let join = exec.join_dependents();
        tokio::pin!(join);
        // Let the join observe the two settled dependents before the late one fails.
        assert!(futures::poll!(join.as_mut()).is_pending());
        late_tx.send(Err(ExecutionError::OperationFailed("late".into()))).unwrap();

        assert_eq!(join.await, Err(ExecutionError::OperationFailed("early".into())));
    }

    #[tokio::test]
    async fn dropped_dependent_counts_as_failure() {
        let exec = execution(1);
        let (tx, rx) = oneshot::channel::<Result<(), ExecutionError>>();
        exec.register_dependent(rx);
        drop(tx);
        assert_eq!(exec.join_dependents().await, Err(ExecutionError::Dropped));
    }

    #[tokio::test]
    async fn handle_resolves_dropped_when_sender_goes_away() {
        let (tx, rx) = oneshot::channel::<Result<u8, ExecutionError>>();
        let handle = ExecutionHandle::new(Some(4), rx);
        assert_eq!(handle.id(), Some(4));
        drop(tx);
        assert_eq!(handle.await, Err(ExecutionError::Dropped));
    }

    #[tokio::test]
    async fn released_permit_is_kept_until_awaited() {
        let exec = execution(1);
        exec.notify_released();
        exec.released().await;
    }
}
