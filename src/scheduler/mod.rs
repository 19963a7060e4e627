pub mod job;
pub mod queue;
pub mod tick;

pub use job::{Job, JobClass, JobFailure, JobStatus, SlotIndex};
pub use queue::{JobQueue, RunningJob};
pub use tick::{decide, StopReason, TickDecision, WaitReason};
