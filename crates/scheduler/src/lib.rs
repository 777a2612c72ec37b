//! Single-concurrency reactor scheduler.
//!
//! A [`Scheduler`] runs submitted work one [`Execution`] at a time in FIFO
//! order. Each execution may carry a timeout that races its operation, may
//! register nested work as dependents that must settle before it finishes,
//! and can hand out [`StaleGuard`]s so long-lived continuations notice when
//! the scheduler has moved on.

pub mod error;
pub mod execution;
pub mod guard;
pub mod metrics;
pub mod runner;
pub mod task;
pub mod types;

pub use error::{ExecutionError, ExecutionResult};
pub use execution::{Execution, ExecutionHandle, ExecutionId};
pub use guard::StaleGuard;
pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use task::{Invocation, Task};
pub use types::{LoadLevel, SchedulerConfig, assess_load};
