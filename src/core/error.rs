//! Error types for the worker pool

/// Result type for worker pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in the worker pool
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Pool has been terminated and no longer accepts work
    #[error("Thread pool is terminated ({pending_jobs} jobs pending)")]
    Terminated {
        /// Number of jobs still queued at the time of the call
        pending_jobs: usize,
    },

    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread #{worker_id}: {message}")]
    SpawnError {
        /// ID of the worker that failed to spawn
        worker_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{worker_id}: {message}")]
    JoinError {
        /// ID of the worker that failed to join
        worker_id: usize,
        /// Error message
        message: String,
    },

    /// Job execution failed or panicked
    #[error("Job execution failed (job_id: {job_id}): {message}")]
    ExecutionError {
        /// ID of the failed job
        job_id: u64,
        /// Error message
        message: String,
    },

    /// Waiting on a job future exceeded the given timeout
    #[error("Job result not ready after {timeout_ms}ms (job_id: {job_id})")]
    WaitTimeout {
        /// ID of the job being waited on
        job_id: u64,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The job backing a future was dropped before producing a result
    #[error("Job result discarded before completion (job_id: {job_id})")]
    ResultDropped {
        /// ID of the discarded job
        job_id: u64,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl PoolError {
    /// Create a terminated error
    pub fn terminated(pending_jobs: usize) -> Self {
        PoolError::Terminated { pending_jobs }
    }

    /// Create a spawn error
    pub fn spawn(worker_id: usize, message: impl Into<String>) -> Self {
        PoolError::SpawnError {
            worker_id,
            message: message.into(),
            source: None,
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        worker_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        PoolError::SpawnError {
            worker_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(worker_id: usize, message: impl Into<String>) -> Self {
        PoolError::JoinError {
            worker_id,
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(job_id: u64, message: impl Into<String>) -> Self {
        PoolError::ExecutionError {
            job_id,
            message: message.into(),
        }
    }

    /// Create a wait timeout error
    pub fn wait_timeout(job_id: u64, timeout_ms: u64) -> Self {
        PoolError::WaitTimeout { job_id, timeout_ms }
    }

    /// Create a result dropped error
    pub fn result_dropped(job_id: u64) -> Self {
        PoolError::ResultDropped { job_id }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PoolError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PoolError::terminated(3);
        assert!(matches!(err, PoolError::Terminated { .. }));

        let err = PoolError::spawn(7, "resource exhausted");
        assert!(matches!(err, PoolError::SpawnError { .. }));

        let err = PoolError::execution(123, "panic in work()");
        assert!(matches!(err, PoolError::ExecutionError { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::terminated(5);
        assert_eq!(
            err.to_string(),
            "Thread pool is terminated (5 jobs pending)"
        );

        let err = PoolError::execution(42, "boom");
        assert_eq!(err.to_string(), "Job execution failed (job_id: 42): boom");

        let err = PoolError::wait_timeout(9, 250);
        assert_eq!(
            err.to_string(),
            "Job result not ready after 250ms (job_id: 9)"
        );

        let err = PoolError::result_dropped(11);
        assert_eq!(
            err.to_string(),
            "Job result discarded before completion (job_id: 11)"
        );
    }

    #[test]
    fn test_spawn_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PoolError::spawn_with_source(2, "Cannot create thread", io_err);

        assert!(matches!(err, PoolError::SpawnError { .. }));
        assert!(err.to_string().contains("worker thread #2"));
    }
}
