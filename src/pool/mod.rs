//! Worker pool: the pool lifecycle owner and its worker threads

pub mod thread_pool;
pub mod worker;

pub use thread_pool::{JobFuture, ThreadPool};
pub use worker::{DispatchStats, Worker};
