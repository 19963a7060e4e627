use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{ProcessorError, Result};
use crate::scheduler::job::{Job, JobClass, JobFailure, JobStatus, SlotIndex};

#[derive(Debug)]
struct Entry<T> {
    job: Job<T>,
    status: JobStatus,
}

/// A job in the running set together with its slot handle.
#[derive(Debug)]
pub struct RunningJob<T> {
    pub slot: SlotIndex,
    pub job: Job<T>,
}

impl<T> Clone for RunningJob<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            job: self.job.clone(),
        }
    }
}

/// Owns every job of a run and partitions them into pending, running,
/// completed and failed.
///
/// Jobs live in a single arena keyed by id; the four sets are ordered index
/// lists into it. Every transfer updates the arena status and the index lists
/// together, so a job is never a member of two sets.
#[derive(Debug)]
pub struct JobQueue<T> {
    jobs: HashMap<Uuid, Entry<T>>,
    pending: Vec<Uuid>,
    running: Vec<(SlotIndex, Uuid)>,
    completed: Vec<Uuid>,
    failed: Vec<Uuid>,
    next_slot: SlotIndex,
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            pending: Vec::new(),
            running: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            next_slot: 0,
        }
    }

    /// Push jobs onto the pending stack. The last job pushed is dispatched
    /// first. Jobs whose id is already tracked are skipped.
    ///
    /// Returns the number of jobs added.
    pub fn seed(&mut self, jobs: Vec<Job<T>>) -> usize {
        let mut added = 0;
        for job in jobs {
            if self.jobs.contains_key(&job.id) {
                tracing::warn!(job_id = %job.id, "Job already tracked, skipping");
                continue;
            }
            self.pending.push(job.id);
            self.jobs.insert(
                job.id,
                Entry {
                    job,
                    status: JobStatus::Pending,
                },
            );
            added += 1;
        }
        added
    }

    /// Peek at the class of the job that would be dispatched next.
    pub fn next_pending_class(&self) -> Option<JobClass> {
        self.pending
            .last()
            .and_then(|id| self.jobs.get(id))
            .map(|entry| entry.job.class)
    }

    /// Move the top of the pending stack into the running set and hand out a
    /// fresh slot for it.
    pub fn pop_into_running(&mut self) -> Result<Option<RunningJob<T>>> {
        let Some(id) = self.pending.pop() else {
            return Ok(None);
        };
        let Some(entry) = self.jobs.get_mut(&id) else {
            return Err(ProcessorError::Fault(format!(
                "pending job {} missing from arena",
                id
            )));
        };

        let slot = self.next_slot;
        self.next_slot += 1;

        entry.status = JobStatus::Running { slot };
        entry.job.attempts += 1;
        self.running.push((slot, id));

        Ok(Some(RunningJob {
            slot,
            job: entry.job.clone(),
        }))
    }

    /// Route a running job to completed or failed.
    ///
    /// Returns the new status, or `None` when no running job holds `slot`
    /// (for instance because the queue was cleared while the job was in flight).
    pub fn settle(
        &mut self,
        slot: SlotIndex,
        outcome: std::result::Result<(), JobFailure>,
    ) -> Option<JobStatus> {
        let position = self.running.iter().position(|(s, _)| *s == slot)?;
        let (_, id) = self.running.remove(position);
        let entry = self.jobs.get_mut(&id)?;

        match outcome {
            Ok(()) => {
                entry.status = JobStatus::Completed;
                self.completed.push(id);
            }
            Err(failure) => {
                entry.status = JobStatus::Failed;
                entry.job.error = Some(failure);
                self.failed.push(id);
            }
        }
        Some(entry.status)
    }

    /// Put every failed job back on the pending stack. Returns the number of
    /// jobs re-queued.
    ///
    /// Jobs still in the running set are left alone: their work is in flight
    /// and they settle through their slot as usual.
    pub fn requeue_failed(&mut self) -> usize {
        if !self.running.is_empty() {
            tracing::debug!(running = self.running.len(), "Requeue with jobs still in flight");
        }

        let requeued = self.failed.len();
        for id in self.failed.drain(..) {
            if let Some(entry) = self.jobs.get_mut(&id) {
                entry.status = JobStatus::Pending;
                self.pending.push(id);
            }
        }
        requeued
    }

    /// Drop every job. Slot handles keep counting up.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.pending.clear();
        self.running.clear();
        self.completed.clear();
        self.failed.clear();
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.status)
    }

    pub fn get_job(&self, id: &Uuid) -> Option<&Job<T>> {
        self.jobs.get(id).map(|entry| &entry.job)
    }

    /// Classes of failed jobs, oldest first.
    pub fn failed_classes(&self) -> impl DoubleEndedIterator<Item = JobClass> + '_ {
        self.failed
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .map(|entry| entry.job.class)
    }

    pub fn pending_jobs(&self) -> Vec<Job<T>> {
        self.collect(&self.pending)
    }

    pub fn running_jobs(&self) -> Vec<RunningJob<T>> {
        self.running
            .iter()
            .filter_map(|(slot, id)| {
                self.jobs.get(id).map(|entry| RunningJob {
                    slot: *slot,
                    job: entry.job.clone(),
                })
            })
            .collect()
    }

    pub fn completed_jobs(&self) -> Vec<Job<T>> {
        self.collect(&self.completed)
    }

    pub fn failed_jobs(&self) -> Vec<Job<T>> {
        self.collect(&self.failed)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    /// Total number of tracked jobs across all four sets.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn collect(&self, ids: &[Uuid]) -> Vec<Job<T>> {
        ids.iter()
            .filter_map(|id| self.jobs.get(id))
            .map(|entry| entry.job.clone())
            .collect()
    }
}
