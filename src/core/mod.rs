//! Core types and traits for the worker pool

pub mod error;
pub mod job;
pub mod priority;

pub use error::{PoolError, Result};
pub use job::{next_job_id, BoxedWork, ClosureWork, Job, Work};
pub use priority::Priority;
