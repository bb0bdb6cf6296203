//! Database schema constants for the job store.
//!
//! All SQL schema definitions for the Postgres backend live here so the
//! migration runner can apply them in order.

/// SQL schema for creating the jobs table.
pub const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id UUID PRIMARY KEY,
    job_type VARCHAR(100) NOT NULL,
    status VARCHAR(20) NOT NULL,
    user_id UUID NOT NULL,
    job_parameters JSONB NOT NULL DEFAULT '{}'::jsonb,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    error_type VARCHAR(100),
    error_context JSONB,
    data_references JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ
)
"#;

/// SQL for creating all required indexes.
///
/// `status` and the timestamps back the recovery sweeper's scans;
/// `user_id` backs owner-scoped listing.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_user_id ON jobs(user_id);
CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_JOBS_TABLE, CREATE_INDEXES]
}

/// Table names in the schema.
pub mod tables {
    /// Jobs table name.
    pub const JOBS: &str = "jobs";
}
