use crate::config::{BlockingFailureScan, ProcessorConfig};
use crate::scheduler::job::JobClass;
use crate::scheduler::queue::JobQueue;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every job was dispatched and has settled.
    Drained,
    /// Too many jobs failed.
    FailureCap,
    /// A Blocking job failed while that is configured to be fatal.
    BlockingFailure,
    /// The processor was cleaned up while the run was active.
    Reset,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Drained => write!(f, "drained"),
            StopReason::FailureCap => write!(f, "failure cap reached"),
            StopReason::BlockingFailure => write!(f, "blocking job failed"),
            StopReason::Reset => write!(f, "reset by cleanup"),
        }
    }
}

/// Why a tick did not dispatch anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Nothing pending, in-flight jobs still settling.
    Draining,
    /// Failure cap hit, waiting for in-flight jobs before stopping.
    FailureCap,
    /// Fatal Blocking failure, waiting for in-flight jobs before stopping.
    BlockingFailure,
    /// A Blocking job holds the exclusion permit.
    BlockingJobActive,
    /// The running set is full.
    AtCapacity,
    /// The next job is Blocking and must wait for the running set to empty.
    ClearingForBlocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Finish(StopReason),
    Wait(WaitReason),
    /// Pop the top of the pending stack and run it.
    Dispatch,
}

/// Decide what a single scheduler tick does. Gates are evaluated in a fixed
/// order and the first one that applies wins.
pub fn decide<T>(
    queue: &JobQueue<T>,
    config: &ProcessorConfig,
    blocking_active: bool,
) -> TickDecision {
    let running = queue.running_len();

    if queue.pending_len() == 0 {
        if running == 0 {
            return TickDecision::Finish(StopReason::Drained);
        }
        return TickDecision::Wait(WaitReason::Draining);
    }

    if queue.failed_len() >= config.max_failed_jobs {
        if running == 0 {
            return TickDecision::Finish(StopReason::FailureCap);
        }
        return TickDecision::Wait(WaitReason::FailureCap);
    }

    if config.fail_on_blocking_error && has_fatal_blocking_failure(queue, config) {
        if running == 0 {
            return TickDecision::Finish(StopReason::BlockingFailure);
        }
        return TickDecision::Wait(WaitReason::BlockingFailure);
    }

    if blocking_active {
        return TickDecision::Wait(WaitReason::BlockingJobActive);
    }

    if running >= config.max_parallel_jobs {
        return TickDecision::Wait(WaitReason::AtCapacity);
    }

    if running > 0 && queue.next_pending_class() == Some(JobClass::Blocking) {
        return TickDecision::Wait(WaitReason::ClearingForBlocking);
    }

    TickDecision::Dispatch
}

fn has_fatal_blocking_failure<T>(queue: &JobQueue<T>, config: &ProcessorConfig) -> bool {
    // Newest failures first: the Blocking job that stalled the run is usually
    // the last one in.
    let mut newest_first = queue.failed_classes().rev();
    match config.blocking_failure_scan {
        BlockingFailureScan::AnyBlocking => newest_first.any(|class| class == JobClass::Blocking),
        BlockingFailureScan::MostRecent => newest_first.next() == Some(JobClass::Blocking),
    }
}
