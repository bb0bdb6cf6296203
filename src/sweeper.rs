//! Recovery sweeper for stuck and orphaned jobs.
//!
//! Jobs can be lost without ever reporting back: a worker crashes mid-run,
//! or the create-time enqueue/dispatch silently fails and nothing picks
//! the job up. The sweeper is the only automatic correction for both
//! cases. On a fixed period it scans the job store and terminally fails:
//!
//! - **stuck** jobs: `processing` with a stale `updated_at`
//!   (`JobTimeoutError`)
//! - **orphaned** jobs: `pending` with a stale `created_at` and
//!   `retry_count` below 2 (`PendingTimeoutError`)
//!
//! The sweep is idempotent: failed jobs no longer match either scan, so a
//! second pass over the same state does nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::job::JobStatus;
use crate::metrics;
use crate::store::{JobStore, StoreError};

/// Error message stored for jobs stuck in `processing`.
const STUCK_MESSAGE: &str = "Job exceeded maximum processing time";

/// Error message stored for jobs abandoned in `pending`.
const ORPHANED_MESSAGE: &str = "Job never started (pending timeout)";

/// Configuration for the recovery sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Age past which `processing`/`pending` jobs count as lost.
    pub stuck_timeout: Duration,
    /// Period between sweeps.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            stuck_timeout: Duration::from_secs(15 * 60),
            interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Outcome of a single sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs failed with `JobTimeoutError`.
    pub stuck_failed: usize,
    /// Jobs failed with `PendingTimeoutError`.
    pub orphaned_failed: usize,
}

impl SweepReport {
    /// Total jobs the pass transitioned to `failed`.
    pub fn total(&self) -> usize {
        self.stuck_failed + self.orphaned_failed
    }

    /// Returns whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Periodic process that terminally fails lost jobs.
pub struct RecoverySweeper {
    store: Arc<dyn JobStore>,
    config: SweeperConfig,
}

impl RecoverySweeper {
    /// Creates a sweeper over the given store.
    pub fn new(store: Arc<dyn JobStore>, config: SweeperConfig) -> Self {
        Self { store, config }
    }

    /// Runs one sweep pass.
    ///
    /// Jobs are marked failed one at a time; a failure on one job is
    /// logged and does not stop the pass. The eligibility cut
    /// (`retry_count < 2` for orphans) lives in the store queries.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        let stuck = self.store.find_stuck(self.config.stuck_timeout).await?;
        for job in &stuck {
            match self
                .mark_failed(job.id, STUCK_MESSAGE, "JobTimeoutError")
                .await
            {
                Ok(()) => {
                    report.stuck_failed += 1;
                    warn!(job_id = %job.id, job_type = %job.job_type, "Failed stuck job");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Could not fail stuck job");
                }
            }
        }

        let orphaned = self.store.find_orphaned(self.config.stuck_timeout).await?;
        for job in &orphaned {
            match self
                .mark_failed(job.id, ORPHANED_MESSAGE, "PendingTimeoutError")
                .await
            {
                Ok(()) => {
                    report.orphaned_failed += 1;
                    warn!(job_id = %job.id, job_type = %job.job_type, "Failed orphaned job");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Could not fail orphaned job");
                }
            }
        }

        if !report.is_empty() {
            info!(
                stuck = report.stuck_failed,
                orphaned = report.orphaned_failed,
                "Recovery sweep complete"
            );
        }

        Ok(report)
    }

    /// Transitions one job to `failed` and records the synthetic error.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        message: &str,
        error_type: &str,
    ) -> Result<(), StoreError> {
        self.store
            .update_status(job_id, JobStatus::Failed, None, None)
            .await?;
        self.store
            .store_error(job_id, message, error_type, None)
            .await?;

        metrics::record_job_recovered(error_type);
        Ok(())
    }

    /// Runs sweeps on the configured interval until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            stuck_timeout_secs = self.config.stuck_timeout.as_secs(),
            "Recovery sweeper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        // The first tick fires immediately; that first sweep is wanted,
        // it recovers anything lost while the process was down.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Recovery sweep failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Recovery sweeper received shutdown signal");
                    break;
                }
            }
        }

        info!("Recovery sweeper stopped");
    }
}
