//! Thread pool implementation

use crate::core::{next_job_id, ClosureWork, Job, PoolError, Priority, Result};
use crate::pool::worker::{panic_message, DispatchStats, Worker};
use crate::queue::JobQueue;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Cadence of the pending-job poll inside [`ThreadPool::stop_pool`]
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A handle to the eventual result of a [`ThreadPool::submit`] call
///
/// The result arrives over a one-shot channel once the job has run. If the
/// job faulted (returned an error or panicked), the fault is delivered here
/// instead of poisoning the worker.
pub struct JobFuture<R> {
    job_id: u64,
    receiver: Receiver<Result<R>>,
}

impl<R> JobFuture<R> {
    /// ID of the job backing this future
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Block until the job has produced a result
    ///
    /// # Errors
    ///
    /// Returns the job's fault, or [`PoolError::ResultDropped`] if the job
    /// was discarded (for example by a shutdown) before it could run
    pub fn wait(self) -> Result<R> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(PoolError::result_dropped(self.job_id)),
        }
    }

    /// Block until the job has produced a result or the timeout elapses
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`PoolError::WaitTimeout`] when the
    /// result is not ready in time
    pub fn wait_timeout(self, timeout: Duration) -> Result<R> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(PoolError::wait_timeout(
                self.job_id,
                timeout.as_millis() as u64,
            )),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::result_dropped(self.job_id)),
        }
    }

    /// Take the result if it is already available
    pub fn try_wait(&self) -> Option<Result<R>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PoolError::result_dropped(self.job_id))),
        }
    }
}

impl<R> std::fmt::Debug for JobFuture<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFuture")
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// A priority-aware worker pool
///
/// The pool owns a [`JobQueue`] and a set of [`Worker`]s, validates job
/// priorities at submission, fans wake-ups out to every worker, and drains
/// the queue on shutdown.
///
/// # Priority demotion
///
/// [`add_job`](ThreadPool::add_job) rewrites a HIGH or LOW job to NORMAL
/// when the worker-count table records no worker of that nominal class, so
/// work is never routed into a bucket nobody serves. The table is refreshed
/// **only** by [`set_worker_priority_counts`](ThreadPool::set_worker_priority_counts);
/// call it after each batch of registrations before submitting
/// priority-sensitive jobs.
///
/// # Example
///
/// ```rust
/// use priority_thread_pool::prelude::*;
/// use std::sync::Arc;
///
/// # fn main() -> Result<()> {
/// let pool = ThreadPool::new();
/// pool.add_worker(Arc::new(Worker::new(Priority::High)))?;
/// pool.add_worker(Arc::new(Worker::new(Priority::Normal)))?;
/// pool.set_worker_priority_counts();
///
/// let future = pool.submit(Priority::High, || 21 + 21);
/// assert_eq!(future.wait()?, 42);
///
/// pool.stop_pool(true, std::time::Duration::ZERO);
/// # Ok(())
/// # }
/// ```
pub struct ThreadPool {
    job_queue: Arc<JobQueue>,
    workers: Arc<Mutex<Vec<Arc<Worker>>>>,
    priority_worker_counts: Mutex<HashMap<Priority, usize>>,
    terminated: AtomicBool,
}

impl ThreadPool {
    /// Create an empty pool
    pub fn new() -> Self {
        let job_queue = JobQueue::new();
        let workers: Arc<Mutex<Vec<Arc<Worker>>>> = Arc::new(Mutex::new(Vec::new()));

        // The queue wakes workers through a callback that captures only a
        // weak handle to the worker set, so no strong reference cycle forms
        // between pool, queue and workers.
        let worker_handle = Arc::downgrade(&workers);
        job_queue.set_wakeup(move || {
            if let Some(workers) = worker_handle.upgrade() {
                for worker in workers.lock().iter() {
                    worker.notify();
                }
            }
        });

        Self {
            job_queue,
            workers,
            priority_worker_counts: Mutex::new(HashMap::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Create a pool with `count` started NORMAL-priority workers
    ///
    /// The worker-count table is refreshed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`] if a worker thread cannot be created
    pub fn with_workers(count: usize) -> Result<Self> {
        let pool = Self::new();
        for _ in 0..count {
            pool.add_worker(Arc::new(Worker::new(Priority::Normal)))?;
        }
        pool.set_worker_priority_counts();
        Ok(pool)
    }

    /// Create a pool with one NORMAL-priority worker per logical CPU
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`] if a worker thread cannot be created
    pub fn with_default_workers() -> Result<Self> {
        Self::with_workers(num_cpus::get())
    }

    /// Register a worker, wire it to the pool's queue and start it
    ///
    /// A worker that is already registered (same handle) is silently
    /// rejected; registration after termination is a silent no-op. The
    /// worker-count table is *not* refreshed automatically - call
    /// [`set_worker_priority_counts`](Self::set_worker_priority_counts).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`] if the worker thread cannot be
    /// created
    pub fn add_worker(&self, worker: Arc<Worker>) -> Result<()> {
        if self.terminated.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut workers = self.workers.lock();
        if workers.iter().any(|registered| Arc::ptr_eq(registered, &worker)) {
            return Ok(());
        }

        worker.bind_queue(Arc::downgrade(&self.job_queue));
        worker.start()?;
        workers.push(worker);
        Ok(())
    }

    /// Unregister a worker
    ///
    /// The worker is **not** stopped: the caller holds the handle and keeps
    /// stop authority. Stop it with [`Worker::stop`] when done (dropping the
    /// last handle also stops it). Unknown workers are ignored.
    pub fn remove_worker(&self, worker: &Arc<Worker>) {
        let mut workers = self.workers.lock();
        workers.retain(|registered| !Arc::ptr_eq(registered, worker));
    }

    /// Recompute the count-by-nominal-priority table from the current
    /// worker set
    ///
    /// [`add_job`](Self::add_job) consults this table for demotion. It is
    /// refreshed only here, never on registration changes; until the first
    /// call every HIGH or LOW job is demoted to NORMAL.
    pub fn set_worker_priority_counts(&self) {
        let workers = self.workers.lock();
        let mut counts = self.priority_worker_counts.lock();

        counts.clear();
        for worker in workers.iter() {
            *counts.entry(worker.priority()).or_insert(0) += 1;
        }
    }

    /// Number of registered workers
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Number of jobs currently queued across all priorities
    pub fn pending_jobs(&self) -> usize {
        self.job_queue.len()
    }

    /// Returns `true` once [`stop_pool`](Self::stop_pool) has been called
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Non-owning handle to the pool's job queue
    pub fn job_queue(&self) -> Weak<JobQueue> {
        Arc::downgrade(&self.job_queue)
    }

    /// Submit a job
    ///
    /// A HIGH or LOW job is demoted to NORMAL first when the worker-count
    /// table records no worker of that nominal class. After termination the
    /// job is silently dropped.
    pub fn add_job(&self, mut job: Job) {
        if self.terminated.load(Ordering::Acquire) {
            #[cfg(feature = "tracing")]
            tracing::debug!(job_id = job.id(), "job dropped: pool is terminated");
            return;
        }

        let priority = job.priority();
        if priority != Priority::Normal {
            let counts = self.priority_worker_counts.lock();
            if counts.get(&priority).copied().unwrap_or(0) == 0 {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    job_id = job.id(),
                    from = %priority,
                    "no worker of nominal class, demoting job to normal"
                );
                job.set_priority(Priority::Normal);
            }
        }

        self.job_queue.push(job);
    }

    /// Submit a callable and get a future for its result
    ///
    /// The callable is packaged as a one-shot job, demoted and enqueued like
    /// any other submission. A panic inside the callable is trapped and
    /// delivered through the returned [`JobFuture`]. Submitting on a
    /// terminated pool yields a future already resolved with
    /// [`PoolError::Terminated`].
    pub fn submit<F, R>(&self, priority: Priority, f: F) -> JobFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let job_id = next_job_id();
        let (sender, receiver) = bounded(1);

        if self.terminated.load(Ordering::Acquire) {
            let _ = sender.send(Err(PoolError::terminated(self.job_queue.len())));
            return JobFuture { job_id, receiver };
        }

        let work = ClosureWork::labeled("submit", move || {
            match catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => {
                    let _ = sender.send(Ok(value));
                    Ok(())
                }
                Err(panic_info) => {
                    let message = panic_message(&*panic_info);
                    let _ = sender.send(Err(PoolError::execution(job_id, message.clone())));
                    Err(PoolError::execution(job_id, message))
                }
            }
        });

        self.add_job(Job::new(job_id, priority, work));
        JobFuture { job_id, receiver }
    }

    /// Submit a callable at NORMAL priority
    pub fn submit_normal<F, R>(&self, f: F) -> JobFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(Priority::Normal, f)
    }

    /// Signal every registered worker to re-evaluate its wait predicate
    ///
    /// Invoked by the queue's wake-up callback after each push; callable
    /// directly as well.
    pub fn notify_wakeup_workers(&self) {
        for worker in self.workers.lock().iter() {
            worker.notify();
        }
    }

    /// Stop the pool
    ///
    /// Marks the pool terminated (submissions become no-ops), optionally
    /// polls the queue at a coarse cadence until it drains or `max_wait`
    /// elapses (a zero `max_wait` means no timeout), then stops every
    /// registered worker in order and clears the worker set. A job that is
    /// executing when its worker is stopped runs to completion. Idempotent.
    pub fn stop_pool(&self, wait_for_finish: bool, max_wait: Duration) {
        self.terminated.store(true, Ordering::Release);

        if wait_for_finish {
            let start = Instant::now();
            while !self.job_queue.is_empty() {
                if !max_wait.is_zero() && start.elapsed() >= max_wait {
                    break;
                }
                thread::sleep(SHUTDOWN_POLL_INTERVAL);
            }
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in &workers {
            worker.stop();
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            workers_stopped = workers.len(),
            jobs_pending = self.job_queue.len(),
            "thread pool stopped"
        );
    }

    /// Get the dispatch counters of every registered worker
    pub fn worker_stats(&self) -> Vec<Arc<DispatchStats>> {
        self.workers.lock().iter().map(|w| w.stats()).collect()
    }

    /// Jobs completed across all registered workers
    pub fn jobs_completed(&self) -> u64 {
        let workers = self.workers.lock();
        workers.iter().map(|w| w.stats().completed()).sum()
    }

    /// Jobs faulted across all registered workers
    pub fn jobs_faulted(&self) -> u64 {
        let workers = self.workers.lock();
        workers.iter().map(|w| w.stats().faulted()).sum()
    }

    /// Jobs panicked across all registered workers
    pub fn jobs_panicked(&self) -> u64 {
        let workers = self.workers.lock();
        workers.iter().map(|w| w.stats().panicked()).sum()
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.worker_count())
            .field("pending_jobs", &self.pending_jobs())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if !self.terminated.load(Ordering::Acquire) {
            self.stop_pool(false, Duration::ZERO);
        }
    }
}
