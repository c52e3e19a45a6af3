//! # Priority Thread Pool
//!
//! A priority-aware worker pool: jobs carry one of three priorities, workers
//! carry a nominal priority plus a fallback match list, and the pool routes
//! (and when necessary demotes) work so that nothing lands in a bucket no
//! worker serves.
//!
//! ## Features
//!
//! - **Three-level scheduling**: HIGH / NORMAL / LOW jobs in FIFO buckets
//!   under a single queue lock
//! - **Priority-fallback workers**: each worker drains its own class first,
//!   then falls back per its match list - implicit work conservation without
//!   stealing
//! - **Priority demotion**: HIGH/LOW submissions are rewritten to NORMAL
//!   when no worker of that nominal class is registered
//! - **Futures**: `submit` returns a waitable handle that also carries
//!   faults and panics out of the worker
//! - **Graceful shutdown**: optional queue drain with timeout, then
//!   cooperative worker stop
//! - **Thread safety**: built on parking_lot and crossbeam
//!
//! ## Quick Start
//!
//! ```rust
//! use priority_thread_pool::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let pool = ThreadPool::new();
//!
//! // One worker per priority class.
//! pool.add_worker(Arc::new(Worker::new(Priority::High)))?;
//! pool.add_worker(Arc::new(Worker::new(Priority::Normal)))?;
//! pool.add_worker(Arc::new(Worker::new(Priority::Low)))?;
//! pool.set_worker_priority_counts();
//!
//! // Fire-and-forget jobs...
//! pool.add_job(Job::from_fn(1, Priority::High, || {
//!     println!("urgent work");
//! }));
//!
//! // ...or submissions with a result.
//! let future = pool.submit(Priority::Normal, || 21 + 21);
//! assert_eq!(future.wait()?, 42);
//!
//! // Drain the queue, then stop every worker.
//! pool.stop_pool(true, std::time::Duration::ZERO);
//! # Ok(())
//! # }
//! ```
//!
//! ## Worker registration
//!
//! The demotion table is refreshed only by an explicit
//! [`ThreadPool::set_worker_priority_counts`] call; invoke it after each
//! batch of registrations that may introduce a new nominal priority class.
//! Without it, HIGH and LOW submissions are demoted to NORMAL even when a
//! matching worker exists.
//!
//! ```rust
//! use priority_thread_pool::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let pool = ThreadPool::new();
//! let worker = Arc::new(Worker::new(Priority::High));
//! pool.add_worker(Arc::clone(&worker))?;
//! pool.set_worker_priority_counts();
//!
//! // `remove_worker` unregisters but deliberately does not stop: the
//! // caller keeps stop authority over the handle it owns.
//! pool.remove_worker(&worker);
//! worker.stop();
//! # pool.stop_pool(false, std::time::Duration::ZERO);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;

pub use crate::core::{BoxedWork, ClosureWork, Job, PoolError, Priority, Result, Work};
pub use pool::{DispatchStats, JobFuture, ThreadPool, Worker};
pub use queue::JobQueue;
