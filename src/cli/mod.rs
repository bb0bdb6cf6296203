//! Command-line interface for jobforge.
//!
//! Provides commands for schema migration, job submission, the queue
//! worker, and the recovery sweeper.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
