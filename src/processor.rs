use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;

use crate::config::ProcessorConfig;
use crate::error::{ProcessorError, Result};
use crate::scheduler::{decide, Job, JobQueue, RunningJob, StopReason, TickDecision};
use crate::worker::{execute, ExecutionResult, JobExecutor, WorkFn};

/// Observes, and may rewrite, the job set before it is seeded.
pub type BeforeStartHook<T> = Box<dyn Fn(&mut Vec<Job<T>>) + Send + Sync>;

/// Runs after every full reset of the processor.
pub type CleanupHook = Box<dyn Fn() + Send + Sync>;

/// Summary of a finished run, captured before any automatic cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

impl RunOutcome {
    fn reset() -> Self {
        Self {
            reason: StopReason::Reset,
            completed: 0,
            failed: 0,
            pending: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.reason != StopReason::Reset && self.failed == 0 && self.pending == 0
    }
}

/// Read-only copy of the processor state.
#[derive(Debug)]
pub struct ProcessorSnapshot<T> {
    pub is_running: bool,
    pub pending: Vec<Job<T>>,
    pub running: Vec<RunningJob<T>>,
    pub completed: Vec<Job<T>>,
    pub failed: Vec<Job<T>>,
}

impl<T> ProcessorSnapshot<T> {
    pub fn total(&self) -> usize {
        self.pending.len() + self.running.len() + self.completed.len() + self.failed.len()
    }
}

struct ProcessorState<T> {
    queue: JobQueue<T>,
    is_running: bool,
    loop_active: bool,
    /// Bumped by every cleanup so that jobs still in flight from an earlier
    /// run cannot settle into the fresh queues.
    generation: u64,
}

struct Shared<T> {
    config: ProcessorConfig,
    executor: JobExecutor<T>,
    state: Mutex<ProcessorState<T>>,
    blocking_permit: Arc<Semaphore>,
    settled: Notify,
    before_start: Option<BeforeStartHook<T>>,
    on_cleanup: Option<CleanupHook>,
}

impl<T> Shared<T> {
    fn lock(&self) -> Result<MutexGuard<'_, ProcessorState<T>>> {
        self.state
            .lock()
            .map_err(|_| ProcessorError::Fault("processor state lock poisoned".to_string()))
    }

    /// Lock for paths that must make progress even after a fault.
    fn lock_recover(&self) -> MutexGuard<'_, ProcessorState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(
        &self,
        generation: u64,
        result: ExecutionResult,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        {
            let mut state = self.lock_recover();
            if state.generation != generation {
                tracing::debug!(job_id = %result.job_id, slot = result.slot, "Dropping result from a reset run");
            } else if state.queue.settle(result.slot, result.outcome).is_none() {
                tracing::warn!(job_id = %result.job_id, slot = result.slot, "Settled job was not running");
            }
            // Release exclusion in the same critical section as the transfer.
            drop(permit);
        }
        self.settled.notify_one();
    }
}

/// Clears the run flags when a `start` or `retry` call goes away, whether it
/// returned, was dropped mid-run or unwound from a panicking hook.
///
/// A cleanup in the meantime bumps the generation and owns the flags from
/// then on, so a stale guard leaves them alone.
struct RunGuard<'a, T> {
    shared: &'a Shared<T>,
    generation: u64,
}

impl<T> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock_recover();
        if state.generation == self.generation {
            state.is_running = false;
            state.loop_active = false;
        }
    }
}

/// Builder for [`JobProcessor`].
pub struct JobProcessorBuilder<T> {
    config: ProcessorConfig,
    blocking: WorkFn<T>,
    non_blocking: WorkFn<T>,
    before_start: Option<BeforeStartHook<T>>,
    on_cleanup: Option<CleanupHook>,
}

impl<T: Send + Sync + 'static> JobProcessorBuilder<T> {
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn before_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Vec<Job<T>>) + Send + Sync + 'static,
    {
        self.before_start = Some(Box::new(hook));
        self
    }

    pub fn on_cleanup<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cleanup = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<JobProcessor<T>> {
        self.config.validate()?;
        Ok(JobProcessor {
            shared: Arc::new(Shared {
                config: self.config,
                executor: JobExecutor::new(self.blocking, self.non_blocking),
                state: Mutex::new(ProcessorState {
                    queue: JobQueue::new(),
                    is_running: false,
                    loop_active: false,
                    generation: 0,
                }),
                blocking_permit: Arc::new(Semaphore::new(1)),
                settled: Notify::new(),
                before_start: self.before_start,
                on_cleanup: self.on_cleanup,
            }),
        })
    }
}

/// Drives a set of blocking and non-blocking jobs to completion.
///
/// A single tick loop makes every scheduling decision; work functions run on
/// their own tasks and report back through the shared queue. Cloning the
/// processor yields another handle to the same state, which is how callers
/// watch progress while [`start`](Self::start) is being awaited.
///
/// # Run lifecycle
///
/// 1. [`start`](Self::start) seeds the pending stack and runs the tick loop
/// 2. The loop ends once everything settled, the failure cap was reached or a
///    Blocking job failed (when that is fatal)
/// 3. Without failures the processor cleans itself up; otherwise the failed
///    and leftover pending jobs stay in place for [`retry`](Self::retry)
pub struct JobProcessor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for JobProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> JobProcessor<T> {
    pub fn builder(blocking: WorkFn<T>, non_blocking: WorkFn<T>) -> JobProcessorBuilder<T> {
        JobProcessorBuilder {
            config: ProcessorConfig::default(),
            blocking,
            non_blocking,
            before_start: None,
            on_cleanup: None,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.shared.config
    }

    /// Start a run and wait for it to finish.
    ///
    /// Rejected with [`ProcessorError::AlreadyRunning`] while another run is
    /// active or jobs are still pending. A run that ends with failed jobs
    /// still resolves `Ok`; inspect [`RunOutcome::failed`] or the snapshot.
    pub async fn start(&self, jobs: Option<Vec<Job<T>>>) -> Result<RunOutcome> {
        let generation = {
            let mut state = self.shared.lock()?;
            if state.loop_active || state.is_running || state.queue.pending_len() != 0 {
                tracing::error!("Cannot start an upload process while another is not completed");
                return Err(ProcessorError::AlreadyRunning);
            }
            state.loop_active = true;
            state.is_running = true;
            state.generation
        };
        let _guard = RunGuard {
            shared: &self.shared,
            generation,
        };

        if let Some(mut jobs) = jobs {
            if let Some(hook) = &self.shared.before_start {
                hook(&mut jobs);
            }
            let mut state = self.shared.lock_recover();
            let seeded = state.queue.seed(jobs);
            tracing::info!(seeded, "Seeded pending jobs");
        }

        self.drive(generation).await
    }

    /// Put every failed job back on the pending stack and run again.
    ///
    /// Leftover pending jobs from the previous run are kept, so this also
    /// resumes a run that stopped early. Completed jobs are never re-run.
    /// With nothing failed it is a plain start over the current queue.
    ///
    /// Unlike [`start`](Self::start) a non-empty pending stack is no reason to
    /// refuse, but a retry is still rejected with
    /// [`ProcessorError::AlreadyRunning`] while a tick loop is active: two
    /// loops over one queue would dispatch the same jobs twice.
    pub async fn retry(&self) -> Result<RunOutcome> {
        let generation = {
            let mut state = self.shared.lock()?;
            if state.loop_active {
                tracing::error!("Cannot retry while a run is in progress");
                return Err(ProcessorError::AlreadyRunning);
            }
            let requeued = state.queue.requeue_failed();
            tracing::info!(requeued, pending = state.queue.pending_len(), "Retrying upload");
            state.loop_active = true;
            state.is_running = true;
            state.generation
        };
        let _guard = RunGuard {
            shared: &self.shared,
            generation,
        };

        self.drive(generation).await
    }

    /// Drop every job and reset the run flags, then run the cleanup hook.
    ///
    /// An active tick loop notices the reset on its next tick and ends with
    /// [`StopReason::Reset`]. The state is rebuilt from scratch, so a poisoned
    /// lock is usable again afterwards.
    pub fn cleanup(&self) {
        {
            let mut state = self.shared.lock_recover();
            state.queue.clear();
            state.is_running = false;
            state.loop_active = false;
            state.generation += 1;
        }
        self.shared.state.clear_poison();
        tracing::debug!("Processor state cleared");
        if let Some(hook) = &self.shared.on_cleanup {
            hook();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_recover().is_running
    }

    pub fn snapshot(&self) -> ProcessorSnapshot<T> {
        let state = self.shared.lock_recover();
        ProcessorSnapshot {
            is_running: state.is_running,
            pending: state.queue.pending_jobs(),
            running: state.queue.running_jobs(),
            completed: state.queue.completed_jobs(),
            failed: state.queue.failed_jobs(),
        }
    }

    pub fn failed_jobs(&self) -> Vec<Job<T>> {
        self.shared.lock_recover().queue.failed_jobs()
    }

    async fn drive(&self, generation: u64) -> Result<RunOutcome> {
        let result = self.run_loop(generation).await;

        match &result {
            Ok(outcome) if outcome.reason == StopReason::Reset => {
                tracing::info!("Run ended by cleanup");
            }
            Ok(outcome) if outcome.failed == 0 => {
                tracing::info!(reason = %outcome.reason, completed = outcome.completed, "Run finished");
                self.cleanup();
            }
            Ok(outcome) => {
                tracing::warn!(
                    reason = %outcome.reason,
                    completed = outcome.completed,
                    failed = outcome.failed,
                    pending = outcome.pending,
                    "Run finished with failed jobs"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Run aborted");
                self.cleanup();
            }
        }

        result
    }

    async fn run_loop(&self, generation: u64) -> Result<RunOutcome> {
        let mut interval = tokio::time::interval(self.shared.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match self.tick(generation)? {
                TickDecision::Finish(StopReason::Reset) => return Ok(RunOutcome::reset()),
                TickDecision::Finish(reason) => {
                    let state = self.shared.lock()?;
                    return Ok(RunOutcome {
                        reason,
                        completed: state.queue.completed_len(),
                        failed: state.queue.failed_len(),
                        pending: state.queue.pending_len(),
                    });
                }
                TickDecision::Dispatch => tokio::task::yield_now().await,
                TickDecision::Wait(_) => {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = self.shared.settled.notified() => {}
                    }
                }
            }
        }
    }

    /// One scheduling step. Never waits on job execution.
    fn tick(&self, generation: u64) -> Result<TickDecision> {
        let (decision, launch) = {
            let mut state = self.shared.lock()?;
            if state.generation != generation {
                return Ok(TickDecision::Finish(StopReason::Reset));
            }
            let blocking_active = self.shared.blocking_permit.available_permits() == 0;
            let decision = decide(&state.queue, &self.shared.config, blocking_active);

            let launch = match decision {
                TickDecision::Dispatch => self.take_next(&mut state)?,
                TickDecision::Wait(reason) => {
                    tracing::trace!(?reason, running = state.queue.running_len(), "Tick waiting");
                    None
                }
                TickDecision::Finish(_) => None,
            };
            (decision, launch)
        };

        if let Some((running, permit)) = launch {
            self.launch(running, permit, generation)?;
        }
        Ok(decision)
    }

    fn take_next(
        &self,
        state: &mut ProcessorState<T>,
    ) -> Result<Option<(RunningJob<T>, Option<OwnedSemaphorePermit>)>> {
        let Some(running) = state.queue.pop_into_running()? else {
            return Ok(None);
        };

        let permit = if running.job.is_blocking() {
            let permit = Arc::clone(&self.shared.blocking_permit)
                .try_acquire_owned()
                .map_err(|e| ProcessorError::Fault(format!("blocking permit unavailable: {}", e)))?;
            Some(permit)
        } else {
            None
        };

        tracing::debug!(
            job_id = %running.job.id,
            slot = running.slot,
            class = %running.job.class,
            attempt = running.job.attempts,
            "Dispatching job"
        );
        Ok(Some((running, permit)))
    }

    fn launch(
        &self,
        running: RunningJob<T>,
        permit: Option<OwnedSemaphorePermit>,
        generation: u64,
    ) -> Result<()> {
        let work = self.shared.executor.run(&running.job)?;
        let shared = Arc::clone(&self.shared);
        let (job_id, slot, class) = (running.job.id, running.slot, running.job.class);

        tokio::spawn(async move {
            let result = execute(job_id, slot, class, work).await;
            shared.settle(generation, result, permit);
        });
        Ok(())
    }
}
