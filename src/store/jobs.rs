//! Postgres-backed job store.
//!
//! The store is the durable record of every job. Rows are only ever
//! inserted and updated, never deleted; status history is not kept, the
//! row always reflects the latest state.
//!
//! The [`JobStore`] trait is the seam the lifecycle service and the
//! recovery sweeper depend on, so tests can substitute an in-memory store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::job::{Job, JobStatus, JobType};

use super::migrations::{MigrationError, MigrationRunner};

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A fetched row did not match the expected shape.
    #[error("Invalid row data: {0}")]
    Decode(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Filter criteria for listing a user's jobs.
#[derive(Debug, Clone)]
pub struct JobFilter {
    /// Restrict to a single status.
    pub status: Option<JobStatus>,
    /// Restrict to a single job type.
    pub job_type: Option<JobType>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            job_type: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl JobFilter {
    /// Creates a filter with default pagination (limit 20, offset 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status filter.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the job type filter.
    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    /// Sets the result limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the offset for pagination.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable record of jobs and their lifecycle state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new `pending` job and returns the stored row.
    ///
    /// Job-type validation happens in the lifecycle service before this
    /// call; the store accepts any known [`JobType`].
    async fn create(
        &self,
        job_type: JobType,
        user_id: Uuid,
        job_parameters: serde_json::Value,
    ) -> Result<Job, StoreError>;

    /// Fetches a job by id.
    ///
    /// When `user_id` is given, a row owned by a different user behaves as
    /// not-found. This is a security contract, not an optimization.
    async fn get(&self, job_id: Uuid, user_id: Option<Uuid>) -> Result<Option<Job>, StoreError>;

    /// Unconditionally sets status and any provided timestamps, refreshing
    /// `updated_at`. Idempotent.
    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Conditionally transitions `pending` → `processing`, setting
    /// `started_at`.
    ///
    /// Returns whether this caller won the transition. A `false` result
    /// means another invocation (for example a redelivered notice) got
    /// there first, or the job is not in `pending`.
    async fn begin_processing(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Records error fields on the job. Does not change status.
    async fn store_error(
        &self,
        job_id: Uuid,
        message: &str,
        error_type: &str,
        context: Option<serde_json::Value>,
    ) -> Result<(), StoreError>;

    /// Records the worker's result payload. Does not change status.
    async fn store_result(
        &self,
        job_id: Uuid,
        data_references: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Lists the user's jobs, most recent first, with a total count
    /// independent of the pagination window.
    async fn list(&self, user_id: Uuid, filter: &JobFilter) -> Result<(Vec<Job>, i64), StoreError>;

    /// Jobs in `processing` whose `updated_at` is older than `older_than`.
    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Job>, StoreError>;

    /// Jobs in `pending` whose `created_at` is older than `older_than` and
    /// whose `retry_count` is below 2.
    async fn find_orphaned(&self, older_than: Duration) -> Result<Vec<Job>, StoreError>;
}

/// Columns selected for every job fetch, in [`job_from_row`] order.
const JOB_COLUMNS: &str = "id, job_type, status, user_id, job_parameters, retry_count, \
     error_message, error_type, error_context, data_references, \
     created_at, updated_at, started_at, completed_at";

/// Maps a `jobs` row to the [`Job`] entity, validating the enum tags.
///
/// Fails fast with [`StoreError::Decode`] when a stored tag does not
/// belong to the known enumerations.
pub(crate) fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let job_type_raw: String = row.try_get("job_type")?;
    let job_type: JobType = job_type_raw
        .parse()
        .map_err(|_| StoreError::Decode(format!("unknown job_type tag '{}'", job_type_raw)))?;

    let status_raw: String = row.try_get("status")?;
    let status: JobStatus = status_raw
        .parse()
        .map_err(|_| StoreError::Decode(format!("unknown status tag '{}'", status_raw)))?;

    Ok(Job {
        id: row.try_get("id")?,
        job_type,
        status,
        user_id: row.try_get("user_id")?,
        job_parameters: row.try_get("job_parameters")?,
        retry_count: row.try_get("retry_count")?,
        error_message: row.try_get("error_message")?,
        error_type: row.try_get("error_type")?,
        error_context: row.try_get("error_context")?,
        data_references: row.try_get("data_references")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Postgres implementation of [`JobStore`].
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Connects to the database and returns a new store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Creates a store from an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let runner = MigrationRunner::new(self.pool.clone());
        runner.run_migrations().await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(
        &self,
        job_type: JobType,
        user_id: Uuid,
        job_parameters: serde_json::Value,
    ) -> Result<Job, StoreError> {
        let query = format!(
            r#"
            INSERT INTO jobs (id, job_type, status, user_id, job_parameters, retry_count)
            VALUES ($1, $2, $3, $4, $5, 0)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(job_type.as_str())
            .bind(JobStatus::Pending.as_str())
            .bind(user_id)
            .bind(&job_parameters)
            .fetch_one(&self.pool)
            .await?;

        job_from_row(&row)
    }

    async fn get(&self, job_id: Uuid, user_id: Option<Uuid>) -> Result<Option<Job>, StoreError> {
        let row = match user_id {
            Some(owner) => {
                let query = format!(
                    "SELECT {} FROM jobs WHERE id = $1 AND user_id = $2",
                    JOB_COLUMNS
                );
                sqlx::query(&query)
                    .bind(job_id)
                    .bind(owner)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                let query = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
                sqlx::query(&query)
                    .bind(job_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                updated_at = NOW(),
                started_at = COALESCE($3, started_at),
                completed_at = COALESCE($4, completed_at)
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(started_at)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn begin_processing(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, updated_at = NOW(), started_at = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Processing.as_str())
        .bind(started_at)
        .bind(JobStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn store_error(
        &self,
        job_id: Uuid,
        message: &str,
        error_type: &str,
        context: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET error_message = $2, error_type = $3, error_context = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(message)
        .bind(error_type)
        .bind(context.unwrap_or_else(|| serde_json::json!({})))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_result(
        &self,
        job_id: Uuid,
        data_references: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET data_references = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(&data_references)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, user_id: Uuid, filter: &JobFilter) -> Result<(Vec<Job>, i64), StoreError> {
        let mut conditions = vec!["user_id = $1".to_string()];
        let mut param_idx = 2;

        if filter.status.is_some() {
            conditions.push(format!("status = ${}", param_idx));
            param_idx += 1;
        }

        if filter.job_type.is_some() {
            conditions.push(format!("job_type = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = conditions.join(" AND ");

        // Total count is taken over the same conditions, independent of
        // the pagination window.
        let count_query = format!("SELECT COUNT(*) FROM jobs WHERE {}", where_clause);
        let mut count = sqlx::query_scalar::<_, i64>(&count_query).bind(user_id);

        if let Some(status) = filter.status {
            count = count.bind(status.as_str());
        }
        if let Some(job_type) = filter.job_type {
            count = count.bind(job_type.as_str());
        }

        let total = count.fetch_one(&self.pool).await?;

        let page_query = format!(
            "SELECT {} FROM jobs WHERE {} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            JOB_COLUMNS,
            where_clause,
            param_idx,
            param_idx + 1
        );

        let mut page = sqlx::query(&page_query).bind(user_id);

        if let Some(status) = filter.status {
            page = page.bind(status.as_str());
        }
        if let Some(job_type) = filter.job_type {
            page = page.bind(job_type.as_str());
        }

        let rows = page
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        let jobs = rows.iter().map(job_from_row).collect::<Result<_, _>>()?;

        Ok((jobs, total))
    }

    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Job>, StoreError> {
        let cutoff = Utc::now() - older_than;
        let query = format!(
            "SELECT {} FROM jobs WHERE status = $1 AND updated_at < $2",
            JOB_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(JobStatus::Processing.as_str())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn find_orphaned(&self, older_than: Duration) -> Result<Vec<Job>, StoreError> {
        let cutoff = Utc::now() - older_than;
        let query = format!(
            "SELECT {} FROM jobs WHERE status = $1 AND created_at < $2 AND retry_count < 2",
            JOB_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(JobStatus::Pending.as_str())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }
}
