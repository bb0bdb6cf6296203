//! Job entity and lifecycle enums.
//!
//! This module defines the core types tracked by the service:
//!
//! - `Job`: a unit of asynchronous work and its full lifecycle record
//! - `JobStatus`: the state machine tag (`pending` → `processing` →
//!   `completed` | `failed`)
//! - `JobType`: closed enumeration of the work the service knows how to
//!   dispatch

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ValidationError;

/// Status of a job in its lifecycle.
///
/// Transitions are monotonic: `Pending` → `Processing` → `Completed` or
/// `Failed`. The recovery sweeper may additionally move `Pending` or
/// `Processing` jobs straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created but not yet picked up by a worker.
    Pending,
    /// A worker has started executing the job.
    Processing,
    /// Terminal: the job finished successfully.
    Completed,
    /// Terminal: the job failed or was abandoned.
    Failed,
}

impl JobStatus {
    /// Returns the lowercase wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status tag does not name a known status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized job status: '{0}'")]
pub struct InvalidStatus(pub String);

impl FromStr for JobStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

/// The kinds of work the service knows how to dispatch.
///
/// This is a closed enumeration: an unknown tag is a parse error
/// (`ValidationError::UnknownJobType`), never a runtime fallback. Each
/// variant maps to exactly one remote worker function, so dispatch
/// resolution is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Minimal no-op job used to exercise the full lifecycle.
    SampleTask,
    /// Exports the caller's data and records a reference to the artifact.
    DataExport,
}

impl JobType {
    /// Returns the snake_case wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SampleTask => "sample_task",
            JobType::DataExport => "data_export",
        }
    }

    /// Returns the remote worker function handling this job type.
    pub fn worker_function(&self) -> &'static str {
        match self {
            JobType::SampleTask => "process_sample_job",
            JobType::DataExport => "process_export_job",
        }
    }

    /// All known job types.
    pub fn all() -> &'static [JobType] {
        &[JobType::SampleTask, JobType::DataExport]
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sample_task" => Ok(JobType::SampleTask),
            "data_export" => Ok(JobType::DataExport),
            other => Err(ValidationError::UnknownJobType(other.to_string())),
        }
    }
}

/// A unit of asynchronous work tracked through its status lifecycle.
///
/// Jobs are stored in Postgres and updated in place; a job is never
/// deleted. `id` and `user_id` are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned at creation.
    pub id: Uuid,
    /// Which worker capability handles this job.
    pub job_type: JobType,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Owner; all reads and listings are scoped to this value.
    pub user_id: Uuid,
    /// Arbitrary input, opaque to the lifecycle core.
    pub job_parameters: serde_json::Value,
    /// Bounds orphan-recovery eligibility (`< 2`).
    pub retry_count: i32,
    /// Human-readable failure description, set on `failed`.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Failure classification tag, set on `failed`.
    #[serde(default)]
    pub error_type: Option<String>,
    /// Free-form diagnostic payload recorded with a failure.
    #[serde(default)]
    pub error_context: Option<serde_json::Value>,
    /// References to artifacts produced by the worker.
    #[serde(default)]
    pub data_references: Option<serde_json::Value>,
    /// When the job was created. Immutable.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
    /// Set on the first transition to `processing`.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set on the transition to `completed`.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a fresh `pending` job.
    ///
    /// The Postgres store assigns timestamps server-side on insert; this
    /// constructor exists for in-memory stores and tests.
    pub fn new(job_type: JobType, user_id: Uuid, job_parameters: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            user_id,
            job_parameters,
            retry_count: 0,
            error_message: None,
            error_type: None,
            error_context: None,
            data_references: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns whether the job has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns how long ago the job was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}
