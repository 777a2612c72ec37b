use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::execution::{Execution, ExecutionHandle};
use crate::task::Invocation;

use super::drain::{Completion, ENCLOSING, drive, settle};
use super::Scheduler;

impl Scheduler {
    /// Start work from inside a running execution without giving up its turn.
    ///
    /// The work starts immediately, ahead of anything queued, and is tracked as
    /// a dependent of the enclosing execution: that execution does not settle
    /// until this work has, and fails with `DependentFailed` if it fails.
    /// A [`Task`](crate::Task) gets an execution of its own, with its own
    /// timeout, which is current while it runs.
    ///
    /// The enclosing execution is the one whose operation (or nested call) is
    /// making this call. Outside any operation it falls back to the current
    /// execution; with nothing current, the returned handle is already failed
    /// with `Detached`.
    pub fn invoke_nested<T: Send + 'static>(
        &self,
        invocation: impl Into<Invocation<T>>,
    ) -> ExecutionHandle<T> {
        let invocation = invocation.into();
        let (dependent_tx, dependent_rx) = oneshot::channel();
        let (tx, rx) = oneshot::channel();

        let scoped = ENCLOSING.try_with(Arc::clone).ok();
        let mut state = self.shared.state();
        let Some(enclosing) = scoped.or_else(|| state.current.clone()) else {
            drop(state);
            warn!("Nested invocation outside of any execution");
            return ExecutionHandle::failed(ExecutionError::Detached);
        };
        let tracked = enclosing.register_dependent(dependent_rx);
        if !tracked {
            warn!(
                enclosing = %enclosing.display_name(),
                "Enclosing execution already settling; nested work runs untracked"
            );
        }

        match invocation {
            Invocation::Call(future) => {
                drop(state);
                debug!(enclosing = %enclosing.display_name(), "Nested call started");
                self.shared.runtime.spawn(async move {
                    let outcome = settle(tokio::spawn(ENCLOSING.scope(enclosing, future)).await);
                    let _ = dependent_tx.send(outcome.as_ref().map(|_| ()).map_err(Clone::clone));
                    let _ = tx.send(outcome);
                });
                ExecutionHandle::new(None, rx)
            }
            Invocation::Schedule(task) => {
                let (operation, timeout, label) = task.into_parts();
                let timeout = self.shared.config.resolve_timeout(timeout);
                let id = state.next_id;
                state.next_id += 1;
                let nested = Arc::new(Execution::new(
                    id,
                    timeout,
                    label,
                    Some(Arc::clone(&enclosing)),
                ));
                // Only take over `current` while the enclosing turn still holds it.
                let in_turn = state
                    .current
                    .as_ref()
                    .is_some_and(|current| current.root_id() == enclosing.root_id());
                if tracked && in_turn {
                    state.current = Some(Arc::clone(&nested));
                }
                drop(state);

                debug!(
                    id,
                    name = %nested.display_name(),
                    enclosing = %enclosing.display_name(),
                    "Nested execution started"
                );
                self.shared.metrics().nested += 1;
                self.shared.runtime.spawn(drive(
                    Arc::downgrade(&self.shared),
                    nested,
                    operation,
                    tx,
                    Completion::Nested {
                        parent: enclosing,
                        dependent: dependent_tx,
                    },
                ));
                ExecutionHandle::new(Some(id), rx)
            }
        }
    }
}
