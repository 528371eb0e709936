//! Thread-safe FIFO of pending jobs.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::sync::lock;

use super::Job;

/// Unbounded FIFO of jobs.
///
/// The lock is held only for a single push or pop, never while a job runs,
/// so a job may enqueue further jobs. There is no capacity limit and no
/// backpressure.
#[derive(Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail.
    pub fn enqueue(&self, job: Job) {
        tracing::trace!("Queued job: {}", job);
        lock(&self.jobs).push_back(job);
    }

    /// Pop the head, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<Job> {
        lock(&self.jobs).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.jobs).is_empty()
    }

    /// Drop every queued job without running it.
    pub fn clear(&self) {
        lock(&self.jobs).clear();
    }
}
