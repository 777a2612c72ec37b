use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ExecutionError;
use crate::types::LoadLevel;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    /// Executions submitted to the queue.
    pub submitted: u64,
    /// Nested tasks started through the bridge.
    pub nested: u64,
    /// Executions that settled successfully.
    pub completed: u64,
    /// Executions that settled with a failure other than a timeout.
    pub failed: u64,
    /// Executions that lost their timeout race.
    pub timed_out: u64,
    /// Turns released explicitly with `finish_current`.
    pub forced_releases: u64,
    /// Executions waiting in the queue.
    pub queue_depth: usize,
    /// Current load level derived from queue depth.
    pub current_load_level: LoadLevel,
    /// Rolling average time from becoming current to settling.
    pub avg_execution_duration: Duration,
    /// When the last execution settled.
    pub last_settled: Option<DateTime<Utc>>,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            submitted: 0,
            nested: 0,
            completed: 0,
            failed: 0,
            timed_out: 0,
            forced_releases: 0,
            queue_depth: 0,
            current_load_level: LoadLevel::Normal,
            avg_execution_duration: Duration::ZERO,
            last_settled: None,
        }
    }
}

impl SchedulerMetrics {
    /// Executions that have settled, whatever the outcome.
    pub fn settled(&self) -> u64 {
        self.completed + self.failed + self.timed_out
    }

    /// Record a settled execution.
    pub fn record_settled(&mut self, failure: Option<&ExecutionError>, duration: Duration) {
        match failure {
            None => self.completed += 1,
            Some(e) if e.is_timeout() => self.timed_out += 1,
            Some(_) => self.failed += 1,
        }
        self.last_settled = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.settled();
        self.avg_execution_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_execution_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }
}
