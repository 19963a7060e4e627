use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::JobClass;

/// Error type returned by work functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Cannot start an upload process while another is not completed")]
    AlreadyRunning,

    #[error("Job {job_id} is {actual} but was handed to the {expected} runner")]
    ClassMismatch {
        job_id: Uuid,
        expected: JobClass,
        actual: JobClass,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler fault: {0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
