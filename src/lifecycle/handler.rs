//! Job-type handler capabilities.
//!
//! Each [`JobType`] is bound to exactly one [`JobHandler`] when the
//! registry is built, so the mapping from type to behavior is fixed at
//! startup rather than resolved through string lookups at runtime. The
//! handler's return value becomes the job's `data_references` payload.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::job::JobType;

/// Business logic for one job type.
///
/// Handlers run inside `process_job`; a returned error is recorded on the
/// job and transitions it to `failed`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Executes the job and returns the `data_references` payload.
    async fn execute(
        &self,
        job_id: Uuid,
        user_id: Uuid,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, ExecutionError>;
}

/// Registry binding every job type to its handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in handlers for all job types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(JobType::SampleTask, Arc::new(SampleTaskHandler));
        registry.register(JobType::DataExport, Arc::new(DataExportHandler));
        registry
    }

    /// Binds a handler to a job type, replacing any previous binding.
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    /// Looks up the handler for a job type.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Minimal handler exercising the full lifecycle.
pub struct SampleTaskHandler;

#[async_trait]
impl JobHandler for SampleTaskHandler {
    async fn execute(
        &self,
        _job_id: Uuid,
        _user_id: Uuid,
        _parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, ExecutionError> {
        Ok(json!({ "completed": true }))
    }
}

/// Exports the caller's data and records where the artifact landed.
pub struct DataExportHandler;

#[async_trait]
impl JobHandler for DataExportHandler {
    async fn execute(
        &self,
        job_id: Uuid,
        user_id: Uuid,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, ExecutionError> {
        let format = parameters
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("json");

        if !matches!(format, "json" | "csv") {
            return Err(ExecutionError::Failed(format!(
                "unsupported export format: {}",
                format
            )));
        }

        Ok(json!({
            "artifact": format!("exports/{}/{}.{}", user_id, job_id, format),
            "format": format,
        }))
    }
}
