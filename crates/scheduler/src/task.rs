use std::future::Future;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

/// Deferred operation of a task. Called once, when its execution becomes current.
pub(crate) type Operation<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// A unit of work that can be submitted to the scheduler or run nested.
///
/// The operation is a closure: its bound context and arguments are whatever
/// it captures. Nothing runs until the scheduler gives the task its turn.
pub struct Task<T> {
    operation: Operation<T>,
    timeout: Option<Duration>,
    label: Option<String>,
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            operation: Box::new(move || operation().boxed()),
            timeout: None,
            label: None,
        }
    }

    /// Race the operation against `timeout`. `Duration::ZERO` disables the
    /// timeout, even when the scheduler has a default one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a label used in log lines.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl<T> Task<T> {
    /// Explicit timeout, or `None` to use the scheduler default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Operation<T>, Option<Duration>, Option<String>) {
        (self.operation, self.timeout, self.label)
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("timeout", &self.timeout)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Work started from inside a running execution.
pub enum Invocation<T> {
    /// An ordinary future. Started immediately and tracked as a dependent of
    /// the current execution.
    Call(BoxFuture<'static, anyhow::Result<T>>),
    /// A task. Becomes an execution of its own that runs immediately, ahead of
    /// anything queued, and is tracked as a dependent of the current execution.
    Schedule(Task<T>),
}

impl<T: Send + 'static> Invocation<T> {
    pub fn call<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Invocation::Call(future.boxed())
    }

    pub fn schedule(task: Task<T>) -> Self {
        Invocation::Schedule(task)
    }
}

impl<T> From<Task<T>> for Invocation<T> {
    fn from(task: Task<T>) -> Self {
        Invocation::Schedule(task)
    }
}
