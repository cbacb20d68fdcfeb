use std::time::Duration;

use crate::types::JobType;

/// Errors returned by the submission and query surface.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The service was never initialized or has been shut down
    #[error("job queue not initialized")]
    NotInitialized,
}

/// Outcome of a failed job attempt.
///
/// `Failed` and `Timeout` are retried by the class policy; `Invalid` and
/// `UnknownJobType` fail the job immediately.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),
    #[error("job timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("invalid job: {0}")]
    Invalid(String),
    #[error("no handler registered for job type {0}")]
    UnknownJobType(JobType),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }

    /// Permanent errors are never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::Invalid(_) | JobError::UnknownJobType(_))
    }
}
