use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BoxError;

/// Stable handle for a job while it sits in the running set.
///
/// Handles are handed out from a counter that never goes backwards, so a
/// handle is never shared by two running jobs, even across retries.
pub type SlotIndex = u64;

/// The two job classes the scheduler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    /// Runs alone: nothing else is dispatched while it executes.
    Blocking,
    /// Runs alongside other non-blocking jobs up to the parallelism cap.
    NonBlocking,
}

impl std::fmt::Display for JobClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobClass::Blocking => write!(f, "blocking"),
            JobClass::NonBlocking => write!(f, "non-blocking"),
        }
    }
}

/// Where a job currently lives. Membership in a queue is the job's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running { slot: SlotIndex },
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running { slot } => write!(f, "running[{}]", slot),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Error record attached to a job when its work fails.
#[derive(Debug, Clone)]
pub struct JobFailure {
    /// Short, user-facing message.
    pub message: String,
    /// Long-form message built from the cause's source chain. May be empty.
    pub full_message: String,
    /// The error returned by the work function.
    pub cause: Arc<dyn std::error::Error + Send + Sync>,
}

impl JobFailure {
    pub const DEFAULT_MESSAGE: &'static str = "Upload failed";

    pub fn new(cause: BoxError) -> Self {
        Self::with_message(Self::DEFAULT_MESSAGE, cause)
    }

    /// Record a failure under a caller-chosen short message.
    pub fn with_message(message: impl Into<String>, cause: BoxError) -> Self {
        let mut full_message = String::new();
        let mut source = cause.source();
        while let Some(err) = source {
            if !full_message.is_empty() {
                full_message.push_str(": ");
            }
            full_message.push_str(&err.to_string());
            source = err.source();
        }

        Self {
            message: message.into(),
            full_message,
            cause: Arc::from(cause),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.cause)
    }
}

/// A unit of work. The payload is shared so that views and work functions can
/// hold it without copying.
#[derive(Debug)]
pub struct Job<T> {
    pub id: Uuid,
    pub class: JobClass,
    pub payload: Arc<T>,
    pub error: Option<JobFailure>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            class: self.class,
            payload: Arc::clone(&self.payload),
            error: self.error.clone(),
            attempts: self.attempts,
            created_at: self.created_at,
        }
    }
}

impl<T> Job<T> {
    pub fn new(class: JobClass, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            class,
            payload: Arc::new(payload),
            error: None,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    pub fn blocking(payload: T) -> Self {
        Self::new(JobClass::Blocking, payload)
    }

    pub fn non_blocking(payload: T) -> Self {
        Self::new(JobClass::NonBlocking, payload)
    }

    pub fn is_blocking(&self) -> bool {
        self.class == JobClass::Blocking
    }
}
