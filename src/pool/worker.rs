//! Worker thread implementation

use crate::core::{Job, PoolError, Priority, Result};
use crate::queue::JobQueue;
use parking_lot::{Condvar, Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{debug, span, Level};

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

/// What a single dispatched job did
#[derive(Debug, Clone, Copy)]
enum Outcome {
    Completed,
    Faulted,
    Panicked,
}

/// Counters describing the jobs a worker has dispatched
///
/// Every popped job lands in exactly one outcome bucket: *completed* (the
/// action returned `Ok`), *faulted* (it returned an error) or *panicked*.
/// A *fallback pick* is a job the worker took from a bucket other than its
/// own nominal class, i.e. through the tail of its match list; the counter
/// makes the priority-fallback policy observable.
#[derive(Debug, Default)]
pub struct DispatchStats {
    completed: AtomicU64,
    faulted: AtomicU64,
    panicked: AtomicU64,
    fallback_picks: AtomicU64,
    busy_micros: AtomicU64,
}

impl DispatchStats {
    fn record(&self, outcome: Outcome, fallback_pick: bool, busy: Duration) {
        let bucket = match outcome {
            Outcome::Completed => &self.completed,
            Outcome::Faulted => &self.faulted,
            Outcome::Panicked => &self.panicked,
        };
        bucket.fetch_add(1, Ordering::Relaxed);

        if fallback_pick {
            self.fallback_picks.fetch_add(1, Ordering::Relaxed);
        }
        self.busy_micros
            .fetch_add(busy.as_micros() as u64, Ordering::Relaxed);
    }

    /// Jobs whose action finished without a fault
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Jobs whose action returned an error
    pub fn faulted(&self) -> u64 {
        self.faulted.load(Ordering::Relaxed)
    }

    /// Jobs whose action panicked
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Jobs taken from outside the worker's own nominal class
    pub fn fallback_picks(&self) -> u64 {
        self.fallback_picks.load(Ordering::Relaxed)
    }

    /// Total jobs this worker has run, whatever the outcome
    pub fn dispatched(&self) -> u64 {
        self.completed() + self.faulted() + self.panicked()
    }

    /// Cumulative wall time spent inside job actions
    pub fn busy_time(&self) -> Duration {
        Duration::from_micros(self.busy_micros.load(Ordering::Relaxed))
    }
}

/// State shared between a [`Worker`] handle and its OS thread
struct WorkerShared {
    id: usize,
    priority: Priority,
    match_list: &'static [Priority],
    stopping: AtomicBool,
    signal: Mutex<()>,
    condvar: Condvar,
    // Non-owning: the pool owns the queue, the worker must not extend its
    // lifetime past teardown.
    queue: RwLock<Weak<JobQueue>>,
    stats: Arc<DispatchStats>,
}

impl WorkerShared {
    /// Wait-loop predicate, re-evaluated on every wake
    fn wake_condition(&self) -> bool {
        if self.stopping.load(Ordering::Acquire) {
            return true;
        }

        match self.queue.read().upgrade() {
            Some(queue) => queue.count(self.match_list) > 0,
            // Queue already released (late-teardown wake); keep sleeping
            // until the stop flag arrives.
            None => false,
        }
    }
}

/// A long-lived worker thread with a priority-fallback selection policy
///
/// A worker is constructed with a nominal [`Priority`]; the derived match
/// list (see [`Priority::match_list`]) fixes which job priorities it will
/// accept and in what order of preference. The thread sleeps on a condition
/// variable until matching work arrives or it is stopped, and executes jobs
/// strictly one at a time.
///
/// Stopping is cooperative: [`stop`](Worker::stop) lets a job that is
/// already running finish, and leaves still-queued jobs in the queue.
pub struct Worker {
    shared: Arc<WorkerShared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Worker {
    /// Create a worker with the given nominal priority (not yet started)
    pub fn new(priority: Priority) -> Self {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);

        Self {
            shared: Arc::new(WorkerShared {
                id,
                priority,
                match_list: priority.match_list(),
                stopping: AtomicBool::new(false),
                signal: Mutex::new(()),
                condvar: Condvar::new(),
                queue: RwLock::new(Weak::new()),
                stats: Arc::new(DispatchStats::default()),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// Get the worker's nominal priority
    pub fn priority(&self) -> Priority {
        self.shared.priority
    }

    /// Get the ordered list of job priorities this worker accepts
    pub fn match_list(&self) -> &'static [Priority] {
        self.shared.match_list
    }

    /// Get this worker's dispatch counters
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Returns `true` if the worker thread is running
    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Wire this worker to a job queue
    ///
    /// Normally done by the pool during registration. The handle is
    /// non-owning; a worker that wakes after the queue has been released
    /// simply goes back to waiting for its stop flag.
    pub fn bind_queue(&self, queue: Weak<JobQueue>) {
        *self.shared.queue.write() = queue;
    }

    /// Start the worker thread
    ///
    /// Calling this on an already-running worker stops it first and then
    /// restarts it on a fresh thread.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`] if the OS thread cannot be created
    pub fn start(&self) -> Result<()> {
        self.stop();

        self.shared.stopping.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name(format!("worker-{}", self.shared.id))
            .spawn(move || {
                Self::run(shared);
            })
            .map_err(|e| PoolError::spawn_with_source(self.shared.id, "spawn failed", e))?;

        *self.thread.lock() = Some(thread);
        Ok(())
    }

    /// Stop the worker thread and join it
    ///
    /// Sets the stop flag, wakes the thread and waits for it to exit. A job
    /// that is currently executing runs to completion first; pending jobs
    /// stay in the queue. Idempotent, and a no-op on a worker that is not
    /// running.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.notify();

        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                let err = PoolError::join(self.shared.id, "worker thread panicked");
                #[cfg(feature = "tracing")]
                tracing::error!(error = %err, "failed to join worker");
                #[cfg(not(feature = "tracing"))]
                eprintln!("[WORKER ERROR] {}", err);
            }
        }
    }

    /// Wake the worker so it re-evaluates its wait predicate
    pub fn notify(&self) {
        // Bridge the signal lock: a worker between its predicate check and
        // the condvar park still holds the lock, so acquiring it here means
        // the worker is parked (or will re-check) before the notify fires.
        drop(self.shared.signal.lock());
        self.shared.condvar.notify_all();
    }

    /// Main worker loop
    fn run(shared: Arc<WorkerShared>) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(
            Level::DEBUG,
            "worker",
            id = shared.id,
            priority = %shared.priority
        );
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        #[cfg(feature = "tracing")]
        debug!("worker started");

        loop {
            let mut guard = shared.signal.lock();
            while !shared.wake_condition() {
                shared.condvar.wait(&mut guard);
            }

            if shared.stopping.load(Ordering::Acquire) {
                break;
            }

            let Some(queue) = shared.queue.read().upgrade() else {
                // Late-teardown wake: the queue is gone, loop back to the
                // wait and pick up the stop flag.
                continue;
            };

            let job = queue.pop(shared.match_list);
            drop(queue);
            drop(guard);

            match job {
                Some(mut job) => Self::execute_job(&shared, &mut job),
                // Another worker raced us to the job.
                None => continue,
            }
        }

        #[cfg(feature = "tracing")]
        debug!(
            dispatched = shared.stats.dispatched(),
            faulted = shared.stats.faulted(),
            "worker stopped"
        );
    }

    /// Run a single popped job, shielding the worker from its faults
    ///
    /// The outcome is recorded against the worker's dispatch counters; a
    /// faulting or panicking action never takes the thread down with it.
    fn execute_job(shared: &WorkerShared, job: &mut Job) {
        // A popped priority different from the worker's nominal one means
        // the job came through the fallback tail of the match list.
        let fallback_pick = job.priority() != shared.priority;

        #[cfg(feature = "tracing")]
        let job_span = span!(
            Level::DEBUG,
            "job_execution",
            job_id = job.id(),
            label = job.label()
        );
        #[cfg(feature = "tracing")]
        let _job_guard = job_span.enter();

        let start = std::time::Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| job.execute()));
        let busy = start.elapsed();

        match outcome {
            Ok(Ok(())) => {
                shared.stats.record(Outcome::Completed, fallback_pick, busy);
                #[cfg(feature = "tracing")]
                debug!(duration_ms = busy.as_millis() as u64, "job completed");
            }
            Ok(Err(e)) => {
                shared.stats.record(Outcome::Faulted, fallback_pick, busy);
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %e,
                    duration_ms = busy.as_millis() as u64,
                    "job faulted"
                );
                #[cfg(not(feature = "tracing"))]
                eprintln!("Worker {}: Job {} faulted: {}", shared.id, job.id(), e);
            }
            Err(panic_info) => {
                shared.stats.record(Outcome::Panicked, fallback_pick, busy);
                let panic_msg = panic_message(&*panic_info);
                #[cfg(feature = "tracing")]
                tracing::error!(
                    panic_message = %panic_msg,
                    duration_ms = busy.as_millis() as u64,
                    "job panicked"
                );
                #[cfg(not(feature = "tracing"))]
                eprintln!(
                    "Worker {}: Job {} panicked: {}",
                    shared.id,
                    job.id(),
                    panic_msg
                );
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.shared.id)
            .field("priority", &self.shared.priority)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Extract a readable message from a caught panic payload
pub(crate) fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
