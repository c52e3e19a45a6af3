//! Convenient re-exports for common types and traits

pub use crate::core::{
    next_job_id, BoxedWork, ClosureWork, Job, PoolError, Priority, Result, Work,
};
pub use crate::pool::{DispatchStats, JobFuture, ThreadPool, Worker};
pub use crate::queue::JobQueue;
