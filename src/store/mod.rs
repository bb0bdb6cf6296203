//! Durable job storage.
//!
//! This module provides the Postgres persistence layer:
//!
//! - **JobStore**: the storage contract the lifecycle service and recovery
//!   sweeper depend on
//! - **PgJobStore**: sqlx-backed implementation over a `PgPool`
//! - **MigrationRunner**: idempotent schema application

pub mod jobs;
pub mod migrations;
pub mod schema;

// Re-export main types for convenience
pub use jobs::{JobFilter, JobStore, PgJobStore, StoreError};
pub use migrations::{MigrationError, MigrationRunner};
