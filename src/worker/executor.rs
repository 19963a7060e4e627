use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::{BoxError, ProcessorError, Result};
use crate::scheduler::{Job, JobClass, JobFailure, SlotIndex};

/// Caller-supplied work for one job class.
pub type WorkFn<T> =
    Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Wrap an async closure into a [`WorkFn`].
pub fn work_fn<T, F, Fut>(f: F) -> WorkFn<T>
where
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    Arc::new(
        move |payload: Arc<T>| -> BoxFuture<'static, std::result::Result<(), BoxError>> {
            Box::pin(f(payload))
        },
    )
}

/// Outcome of one job execution
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub slot: SlotIndex,
    pub class: JobClass,
    pub outcome: std::result::Result<(), JobFailure>,
}

/// Runs jobs through the work function matching their class.
///
/// The executor invokes the work exactly once per call and never retries;
/// retrying is the processor's business.
pub struct JobExecutor<T> {
    blocking: WorkFn<T>,
    non_blocking: WorkFn<T>,
}

impl<T> Clone for JobExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            blocking: Arc::clone(&self.blocking),
            non_blocking: Arc::clone(&self.non_blocking),
        }
    }
}

impl<T: Send + Sync + 'static> JobExecutor<T> {
    pub fn new(blocking: WorkFn<T>, non_blocking: WorkFn<T>) -> Self {
        Self {
            blocking,
            non_blocking,
        }
    }

    /// Start the blocking work for `job`. Fails fast if `job` is not Blocking.
    pub fn run_blocking(
        &self,
        job: &Job<T>,
    ) -> Result<BoxFuture<'static, std::result::Result<(), BoxError>>> {
        Self::check_class(job, JobClass::Blocking)?;
        tracing::debug!(job_id = %job.id, "Processing blocking job");
        Ok((self.blocking)(Arc::clone(&job.payload)))
    }

    /// Start the non-blocking work for `job`. Fails fast if `job` is not
    /// Non-blocking.
    pub fn run_non_blocking(
        &self,
        job: &Job<T>,
    ) -> Result<BoxFuture<'static, std::result::Result<(), BoxError>>> {
        Self::check_class(job, JobClass::NonBlocking)?;
        tracing::debug!(job_id = %job.id, "Processing non-blocking job");
        Ok((self.non_blocking)(Arc::clone(&job.payload)))
    }

    pub fn run(
        &self,
        job: &Job<T>,
    ) -> Result<BoxFuture<'static, std::result::Result<(), BoxError>>> {
        match job.class {
            JobClass::Blocking => self.run_blocking(job),
            JobClass::NonBlocking => self.run_non_blocking(job),
        }
    }

    fn check_class(job: &Job<T>, expected: JobClass) -> Result<()> {
        if job.class != expected {
            return Err(ProcessorError::ClassMismatch {
                job_id: job.id,
                expected,
                actual: job.class,
            });
        }
        Ok(())
    }
}

/// Drive a started job to completion.
///
/// The work runs on its own task so that a panic inside it is reported as
/// a job failure instead of tearing down the caller.
pub async fn execute(
    job_id: Uuid,
    slot: SlotIndex,
    class: JobClass,
    work: BoxFuture<'static, std::result::Result<(), BoxError>>,
) -> ExecutionResult {
    let outcome = match tokio::spawn(work).await {
        Ok(Ok(())) => {
            tracing::info!(job_id = %job_id, slot, class = %class, "Job completed");
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::warn!(job_id = %job_id, slot, class = %class, error = %e, "Job failed");
            Err(JobFailure::new(e))
        }
        Err(join_err) => {
            tracing::error!(job_id = %job_id, slot, class = %class, error = %join_err, "Job panicked");
            Err(JobFailure::new(Box::new(join_err)))
        }
    };

    ExecutionResult {
        job_id,
        slot,
        class,
        outcome,
    }
}
