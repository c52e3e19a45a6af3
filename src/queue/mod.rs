//! Priority-keyed job queue
//!
//! [`JobQueue`] stores pending jobs in one FIFO bucket per [`Priority`].
//! A single mutex guards the whole bucket map; every public operation is a
//! short critical section. After each successful push the queue invokes a
//! registered wake-up callback so sleeping workers re-check their
//! predicates.
//!
//! Pop order is the *caller's* policy: [`JobQueue::pop`] walks the given
//! priority list and takes the head of the first non-empty bucket. The
//! queue itself imposes no ordering across priorities.

use crate::core::{Job, Priority};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

type WakeupFn = Box<dyn Fn() + Send + Sync + 'static>;

/// Thread-safe multi-bucket job queue keyed by priority
///
/// Shared as `Arc<JobQueue>` by the pool that owns it; workers hold only
/// [`Weak`] handles so the queue's lifetime is bounded by the pool.
pub struct JobQueue {
    self_weak: Weak<JobQueue>,
    // Buckets are created on first use and may linger empty afterwards.
    buckets: Mutex<BTreeMap<Priority, VecDeque<Job>>>,
    wakeup: RwLock<Option<WakeupFn>>,
}

impl JobQueue {
    /// Create a new empty queue
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_weak: weak.clone(),
            buckets: Mutex::new(BTreeMap::new()),
            wakeup: RwLock::new(None),
        })
    }

    /// Register the no-arg callback invoked after every successful push
    ///
    /// The pool registers its worker broadcast here at construction time.
    pub fn set_wakeup<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.wakeup.write() = Some(Box::new(callback));
    }

    /// Insert a job at the back of the bucket for its priority
    ///
    /// The job receives a non-owning handle to this queue before insertion
    /// (see [`Work::bind_queue`](crate::core::Work::bind_queue)). The
    /// wake-up callback runs after the bucket lock has been released; a
    /// worker awakened by it is guaranteed to observe the job on its next
    /// [`pop`](Self::pop).
    pub fn push(&self, mut job: Job) {
        job.bind_queue(self.self_weak.clone());

        {
            let mut buckets = self.buckets.lock();
            buckets.entry(job.priority()).or_default().push_back(job);
        }

        if let Some(callback) = self.wakeup.read().as_ref() {
            callback();
        }
    }

    /// Remove and return the head of the first non-empty bucket in
    /// `priorities` order
    ///
    /// Returns `None` when no listed bucket holds a job. Exactly one caller
    /// observes any given job; it is out of the queue before the lock is
    /// released.
    pub fn pop(&self, priorities: &[Priority]) -> Option<Job> {
        let mut buckets = self.buckets.lock();

        for priority in priorities {
            if let Some(bucket) = buckets.get_mut(priority) {
                if let Some(job) = bucket.pop_front() {
                    return Some(job);
                }
            }
        }

        None
    }

    /// Total number of pending jobs across all buckets
    pub fn len(&self) -> usize {
        self.buckets.lock().values().map(VecDeque::len).sum()
    }

    /// Returns `true` if no bucket holds a job
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pending jobs across the listed priorities' buckets
    pub fn count(&self, priorities: &[Priority]) -> usize {
        let buckets = self.buckets.lock();

        priorities
            .iter()
            .filter_map(|priority| buckets.get(priority))
            .map(VecDeque::len)
            .sum()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.lock();
        let mut counts = f.debug_map();
        for (priority, bucket) in buckets.iter() {
            counts.entry(priority, &bucket.len());
        }
        counts.finish()
    }
}
