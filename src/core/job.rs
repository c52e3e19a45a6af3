//! The job envelope and the `Work` trait
//!
//! A [`Job`] is a single unit of deferred work: an identifier, a
//! [`Priority`], an invocable action and an optional opaque payload. The
//! action itself is anything implementing [`Work`]; plain closures are
//! adapted through [`ClosureWork`] or [`Job::from_fn`].

use crate::core::error::{PoolError, Result};
use crate::core::priority::Priority;
use crate::queue::JobQueue;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Generates a process-wide unique job ID
pub fn next_job_id() -> u64 {
    NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)
}

/// The invocable action carried by a [`Job`]
///
/// Implementors supply the body a worker runs after popping the job. The
/// receiver is `&mut self` so one-shot actions can consume their own state:
/// within the pool an action is invoked at most once per job.
pub trait Work: Send {
    /// Run the action
    ///
    /// # Errors
    ///
    /// An error marks the job as faulted; the worker records it and moves
    /// on to the next job
    fn execute(&mut self) -> Result<()>;

    /// Short label for logs and [`Debug`](fmt::Debug) output
    fn label(&self) -> &str {
        "work"
    }

    /// Called by the queue when the enclosing job is enqueued.
    ///
    /// Implementations that want to submit follow-up jobs from inside
    /// [`execute`](Self::execute) can store the handle and upgrade it later.
    /// The handle is non-owning, so a stored copy never extends the queue's
    /// lifetime past the pool that owns it.
    fn bind_queue(&mut self, _queue: Weak<JobQueue>) {}
}

/// A boxed work action that can be sent across threads
pub type BoxedWork = Box<dyn Work>;

/// Adapts a one-shot closure to [`Work`]
///
/// The closure is taken out of the adapter the first time it runs. The pool
/// never runs a popped job twice, so a second execution can only happen
/// when the envelope is driven by hand; it is reported as a fault rather
/// than a quiet no-op.
pub struct ClosureWork<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    label: &'static str,
    closure: Option<F>,
}

impl<F> ClosureWork<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    /// Wrap a closure under the default `"closure"` label
    pub fn new(closure: F) -> Self {
        Self::labeled("closure", closure)
    }

    /// Wrap a closure under a custom label
    pub fn labeled(label: &'static str, closure: F) -> Self {
        Self {
            label,
            closure: Some(closure),
        }
    }
}

impl<F> Work for ClosureWork<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        // A second call means the envelope was driven outside the pool;
        // that is a fault, not a no-op.
        let Some(closure) = self.closure.take() else {
            return Err(PoolError::other(format!(
                "'{}' action was already consumed by an earlier execution",
                self.label
            )));
        };

        closure()
    }

    fn label(&self) -> &str {
        self.label
    }
}

/// A single unit of deferred work with a priority and an identifier
///
/// A job is *pending* while it sits in a queue bucket, *running* while a
/// worker holds it, and released afterwards. The work action is called at
/// most once; the payload is dropped together with the job.
pub struct Job {
    id: u64,
    priority: Priority,
    work: BoxedWork,
    payload: Option<Box<dyn Any + Send>>,
}

impl Job {
    /// Create a job from any [`Work`] implementation
    pub fn new<W: Work + 'static>(id: u64, priority: Priority, work: W) -> Self {
        Self {
            id,
            priority,
            work: Box::new(work),
            payload: None,
        }
    }

    /// Create a job from a plain closure
    pub fn from_fn<F>(id: u64, priority: Priority, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(
            id,
            priority,
            ClosureWork::new(move || {
                f();
                Ok(())
            }),
        )
    }

    /// Create a normal-priority job from a plain closure
    pub fn normal<F>(id: u64, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_fn(id, Priority::Normal, f)
    }

    /// Attach an opaque payload owned by this job
    ///
    /// The payload travels with the job and is released when the job is
    /// dropped; the pool never inspects it.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_payload(mut self, payload: Box<dyn Any + Send>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Get the job ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the job priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Rewrite the job priority
    ///
    /// The pool uses this to demote HIGH/LOW jobs to NORMAL when no worker
    /// of the nominal class is registered.
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Get a reference to the payload, if any
    pub fn payload(&self) -> Option<&(dyn Any + Send)> {
        self.payload.as_deref()
    }

    /// Take the payload out of the job, if any
    pub fn take_payload(&mut self) -> Option<Box<dyn Any + Send>> {
        self.payload.take()
    }

    /// Get the work action's label
    pub fn label(&self) -> &str {
        self.work.label()
    }

    /// Run the job's work action
    ///
    /// # Errors
    ///
    /// Propagates the error returned by the underlying [`Work`]
    pub fn execute(&mut self) -> Result<()> {
        self.work.execute()
    }

    pub(crate) fn bind_queue(&mut self, queue: Weak<JobQueue>) {
        self.work.bind_queue(queue);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("label", &self.work.label())
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}
