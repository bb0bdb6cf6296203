//! Cross-cutting error types for the job lifecycle core.
//!
//! Infrastructure errors live next to their subsystems (`StoreError` in
//! `store`, `QueueError` in `queue`, `DispatchError` in `dispatch`). The
//! types here cross module boundaries: validation failures surface
//! synchronously to the caller at creation time, execution failures are
//! recorded on the job row and observed through later reads.

use thiserror::Error;

use crate::job::JobType;

/// Caller-visible rejection of a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The submitted tag does not name a known job type.
    #[error("Invalid job_type: {0}")]
    UnknownJobType(String),
}

/// Failure raised while a worker executes a job.
///
/// Never propagated to the submitting caller; the lifecycle service writes
/// it into the job's error fields and transitions the job to `failed`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The job-type tag delivered with the work item could not be parsed.
    ///
    /// At processing time this is a runtime failure, not a validation
    /// error: the job row already exists and must be terminally failed.
    #[error("Unknown job_type: {0}")]
    UnknownJobType(String),

    /// No handler is registered for the job type.
    #[error("No handler registered for job type '{0}'")]
    NoHandler(JobType),

    /// The handler itself failed.
    #[error("{0}")]
    Failed(String),
}

impl ExecutionError {
    /// Classification tag stored in the job's `error_type` column.
    pub fn error_type(&self) -> &'static str {
        match self {
            ExecutionError::UnknownJobType(_) => "UnknownJobType",
            ExecutionError::NoHandler(_) => "NoHandler",
            ExecutionError::Failed(_) => "ExecutionError",
        }
    }
}
