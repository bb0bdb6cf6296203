//! Job lifecycle orchestration.
//!
//! This module ties the store, queue and dispatcher together:
//!
//! - **JobService**: create / process / get / list operations
//! - **JobHandler** and **HandlerRegistry**: per-type business logic
//! - **NoticeConsumer**: worker loop draining the delivery queue
//!
//! # Control Flow
//!
//! ```text
//!   caller ──► JobService::create_job ──► Job Store (pending)
//!                                     ──► Delivery Queue (notice)
//!                                     ──► Dispatcher (spawn)
//!
//!   worker ──► JobService::process_job ──► processing ──► completed
//!                                                    └──► failed
//! ```

pub mod consumer;
pub mod handler;
pub mod service;

// Re-export main types for convenience
pub use consumer::{ConsumerConfig, NoticeConsumer};
pub use handler::{DataExportHandler, HandlerRegistry, JobHandler, SampleTaskHandler};
pub use service::{JobService, LifecycleError};
