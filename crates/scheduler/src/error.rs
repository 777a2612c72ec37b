use std::any::Any;
use std::time::Duration;

use tokio::task::JoinError;

use crate::execution::ExecutionId;

/// Reason an execution (or a nested invocation) did not produce a value.
///
/// Reasons are carried as strings so the same failure can be delivered to the
/// submitter and to the enclosing execution that joins on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The timeout timer fired before the operation settled.
    #[error("Execution timed out after {0:?}")]
    TimeoutExceeded(Duration),
    /// The operation returned an error or panicked.
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// A dependent registered during the execution failed.
    #[error("Dependent failed: {0}")]
    DependentFailed(String),
    /// A nested invocation was made while no execution was current.
    #[error("No current execution to join")]
    Detached,
    /// A stale guard detected that the scheduler advanced past its turn.
    #[error("Superseded: guard issued at {issued_at}, scheduler now at {active}")]
    Superseded {
        issued_at: ExecutionId,
        active: ExecutionId,
    },
    /// The scheduler was dropped before the outcome was delivered.
    #[error("Execution dropped before it settled")]
    Dropped,
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

impl ExecutionError {
    /// Whether this failure is a lost timeout race.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::TimeoutExceeded(_))
    }

    /// The underlying reason, without the kind prefix.
    pub fn reason(&self) -> String {
        match self {
            ExecutionError::OperationFailed(reason) | ExecutionError::DependentFailed(reason) => {
                reason.clone()
            }
            other => other.to_string(),
        }
    }

    pub(crate) fn from_operation(err: anyhow::Error) -> Self {
        ExecutionError::OperationFailed(format!("{err:#}"))
    }

    pub(crate) fn from_join(err: JoinError) -> Self {
        if err.is_panic() {
            Self::from_panic(err.into_panic())
        } else {
            ExecutionError::OperationFailed("operation task was cancelled".to_string())
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ExecutionError::OperationFailed(format!("panicked: {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_distinguishable() {
        let err = ExecutionError::TimeoutExceeded(Duration::from_millis(10));
        assert!(err.is_timeout());
        assert!(!ExecutionError::OperationFailed("x".into()).is_timeout());
        assert!(err.to_string().contains("10ms"));
    }

    #[test]
    fn reason_strips_kind_prefix() {
        let err = ExecutionError::OperationFailed("disk full".into());
        assert_eq!(err.reason(), "disk full");
        let wrapped = ExecutionError::DependentFailed(err.reason());
        assert_eq!(wrapped.to_string(), "Dependent failed: disk full");
    }

    #[test]
    fn operation_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("fetching page");
        let failure = ExecutionError::from_operation(err);
        assert_eq!(
            failure,
            ExecutionError::OperationFailed("fetching page: connection reset".into())
        );
    }

    #[test]
    fn panic_payloads_are_described() {
        let failure = ExecutionError::from_panic(Box::new("boom"));
        assert_eq!(failure.reason(), "panicked: boom");
        let failure = ExecutionError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(failure.reason(), "panicked: owned boom");
        let failure = ExecutionError::from_panic(Box::new(42_u8));
        assert_eq!(failure.reason(), "panicked: unknown panic payload");
    }
}
