use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessorError, Result};

/// How the failed set is inspected when deciding whether a Blocking failure
/// ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingFailureScan {
    /// Any Blocking job in the failed set stops the run.
    #[default]
    AnyBlocking,
    /// Only stop when the most recently failed job is Blocking.
    MostRecent,
}

/// Tunables for a [`JobProcessor`](crate::processor::JobProcessor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Upper bound on jobs in the running set.
    pub max_parallel_jobs: usize,
    /// Once this many jobs have failed no new work is dispatched.
    pub max_failed_jobs: usize,
    /// Period of the scheduler tick.
    pub tick_interval: Duration,
    /// Stop the run after a Blocking job fails.
    pub fail_on_blocking_error: bool,
    pub blocking_failure_scan: BlockingFailureScan,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 4,
            max_failed_jobs: 10,
            tick_interval: Duration::from_millis(500),
            fail_on_blocking_error: true,
            blocking_failure_scan: BlockingFailureScan::AnyBlocking,
        }
    }
}

impl ProcessorConfig {
    pub fn with_max_parallel_jobs(mut self, max_parallel_jobs: usize) -> Self {
        self.max_parallel_jobs = max_parallel_jobs;
        self
    }

    pub fn with_max_failed_jobs(mut self, max_failed_jobs: usize) -> Self {
        self.max_failed_jobs = max_failed_jobs;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_fail_on_blocking_error(mut self, fail: bool) -> Self {
        self.fail_on_blocking_error = fail;
        self
    }

    pub fn with_blocking_failure_scan(mut self, scan: BlockingFailureScan) -> Self {
        self.blocking_failure_scan = scan;
        self
    }

    /// Reject limits that would stall or never dispatch.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_jobs == 0 {
            return Err(ProcessorError::InvalidConfig(
                "max_parallel_jobs must be at least 1".to_string(),
            ));
        }
        if self.max_failed_jobs == 0 {
            return Err(ProcessorError::InvalidConfig(
                "max_failed_jobs must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ProcessorError::InvalidConfig(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
