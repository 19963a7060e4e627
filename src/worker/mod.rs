//! Execution side of the processor.
//!
//! - [`JobExecutor`]: validates a job's class against the work function it is
//!   about to run, starts the work and turns its result into an
//!   [`ExecutionResult`](executor::ExecutionResult)
//!
//! # Execution Flow
//!
//! 1. The scheduler tick pops a job and asks the executor for its work future
//! 2. A class mismatch is returned synchronously and nothing runs
//! 3. [`execute`](executor::execute) awaits the work on a separate task
//! 4. Success or failure is routed back into the queue by the processor

pub mod executor;

pub use executor::{execute, work_fn, ExecutionResult, JobExecutor, WorkFn};
