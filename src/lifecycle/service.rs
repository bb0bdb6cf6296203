//! Job lifecycle orchestration.
//!
//! `JobService` owns the four operations the outer layers call into:
//! `create_job`, `process_job`, `get_job` and `list_jobs`. Creation is a
//! non-atomic three-step sequence (store insert → queue send → dispatch);
//! a failure after the insert leaves a `pending` row that the recovery
//! sweeper terminally fails later, so enqueue and dispatch failures are
//! logged rather than returned.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{ExecutionError, ValidationError};
use crate::job::{Job, JobStatus, JobType};
use crate::metrics;
use crate::queue::{DeliveryNotice, DeliveryQueue};
use crate::store::{JobFilter, JobStore, StoreError};

use super::handler::HandlerRegistry;

/// Errors surfaced to lifecycle callers.
///
/// Execution failures never appear here: processing is asynchronous, so
/// they are recorded on the job row instead.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The submission was rejected before any state was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The job store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Orchestrates job creation, processing and reads.
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DeliveryQueue>,
    dispatcher: Dispatcher,
    handlers: HandlerRegistry,
}

impl JobService {
    /// Creates a service over its injected collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DeliveryQueue>,
        dispatcher: Dispatcher,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            store,
            queue,
            dispatcher,
            handlers,
        }
    }

    /// Creates a job: validates the type tag, inserts the `pending` row,
    /// sends a delivery notice and requests remote execution.
    ///
    /// The created job is returned even when enqueue or dispatch fail;
    /// those failures are logged and left to the recovery sweep.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Validation` for an unknown job type (no
    /// row is created) and `LifecycleError::Store` if the insert fails.
    pub async fn create_job(
        &self,
        job_type_tag: &str,
        user_id: Uuid,
        job_parameters: serde_json::Value,
    ) -> Result<Job, LifecycleError> {
        let job_type: JobType = job_type_tag.parse()?;

        let job = self
            .store
            .create(job_type, user_id, job_parameters.clone())
            .await?;

        info!(job_id = %job.id, job_type = %job_type, user_id = %user_id, "Job created");
        metrics::record_job_created(job_type.as_str());

        let notice = DeliveryNotice::new(job.id, job_type, user_id, job_parameters.clone());
        if let Err(e) = self.queue.send(notice).await {
            warn!(
                job_id = %job.id,
                error = %e,
                "Failed to enqueue delivery notice; job stays pending until the recovery sweep"
            );
        }

        if let Err(e) = self
            .dispatcher
            .spawn(job.id, job_type, user_id, &job_parameters)
            .await
        {
            warn!(
                job_id = %job.id,
                error = %e,
                "Failed to dispatch job; job stays pending until the recovery sweep"
            );
        }

        Ok(job)
    }

    /// Processes a job on behalf of a worker.
    ///
    /// Transitions `pending` → `processing` with a conditional update: a
    /// redelivered notice that loses the race is dropped without touching
    /// the row. Handler success records the result and completes the job;
    /// any handler failure (including an unrecognized type tag, which at
    /// this stage is a runtime failure) records the error and fails it.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Store` only for storage failures;
    /// execution outcomes are recorded on the job.
    pub async fn process_job(
        &self,
        job_id: Uuid,
        job_type_tag: &str,
        user_id: Uuid,
        job_parameters: serde_json::Value,
    ) -> Result<(), LifecycleError> {
        let started_at = Utc::now();

        if !self.store.begin_processing(job_id, started_at).await? {
            debug!(
                job_id = %job_id,
                "Job is not pending; dropping duplicate or stale work item"
            );
            return Ok(());
        }

        info!(job_id = %job_id, job_type = %job_type_tag, "Processing job");

        match self
            .execute(job_id, job_type_tag, user_id, &job_parameters)
            .await
        {
            Ok(data_references) => {
                self.store.store_result(job_id, data_references).await?;
                self.store
                    .update_status(job_id, JobStatus::Completed, None, Some(Utc::now()))
                    .await?;

                metrics::record_job_completed(job_type_tag);
                info!(job_id = %job_id, "Job completed");
            }
            Err(e) => {
                let context = json!({ "job_parameters": job_parameters });
                self.store
                    .store_error(job_id, &e.to_string(), e.error_type(), Some(context))
                    .await?;
                self.store
                    .update_status(job_id, JobStatus::Failed, None, None)
                    .await?;

                metrics::record_job_failed(e.error_type());
                warn!(job_id = %job_id, error = %e, "Job failed");
            }
        }

        Ok(())
    }

    /// Resolves the type tag and runs its handler.
    async fn execute(
        &self,
        job_id: Uuid,
        job_type_tag: &str,
        user_id: Uuid,
        parameters: &serde_json::Value,
    ) -> Result<serde_json::Value, ExecutionError> {
        let job_type: JobType = job_type_tag
            .parse()
            .map_err(|_| ExecutionError::UnknownJobType(job_type_tag.to_string()))?;

        let handler = self
            .handlers
            .get(job_type)
            .ok_or(ExecutionError::NoHandler(job_type))?;

        handler.execute(job_id, user_id, parameters).await
    }

    /// Fetches a job, scoped to its owner.
    pub async fn get_job(
        &self,
        job_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Job>, LifecycleError> {
        Ok(self.store.get(job_id, Some(user_id)).await?)
    }

    /// Lists a user's jobs, most recent first.
    pub async fn list_jobs(
        &self,
        user_id: Uuid,
        filter: &JobFilter,
    ) -> Result<(Vec<Job>, i64), LifecycleError> {
        Ok(self.store.list(user_id, filter).await?)
    }
}
