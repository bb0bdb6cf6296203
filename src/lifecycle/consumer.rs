//! Delivery queue consumer.
//!
//! Drains the delivery queue into `JobService::process_job`. Each notice
//! is acknowledged (deleted) after processing returns; a storage failure
//! leaves the notice parked so it redelivers after the visibility timeout.
//!
//! Workers invoked directly by the dispatcher and this consumer are two
//! independent paths to `process_job`; the conditional `pending` →
//! `processing` transition makes whichever arrives second a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::queue::{DeliveryQueue, QueueError, ReceivedNotice};

use super::service::JobService;

/// Configuration for the notice consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum notices fetched per read.
    pub read_batch: usize,
    /// Visibility window requested for each read notice.
    pub visibility_timeout: Duration,
    /// How long to sleep when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            read_batch: 10,
            visibility_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ConsumerConfig {
    /// Sets the read batch size.
    pub fn with_read_batch(mut self, read_batch: usize) -> Self {
        self.read_batch = read_batch;
        self
    }

    /// Sets the visibility timeout.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Worker loop feeding queued notices into the lifecycle service.
pub struct NoticeConsumer {
    service: Arc<JobService>,
    queue: Arc<dyn DeliveryQueue>,
    config: ConsumerConfig,
}

impl NoticeConsumer {
    /// Creates a consumer over the given service and queue.
    pub fn new(
        service: Arc<JobService>,
        queue: Arc<dyn DeliveryQueue>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            service,
            queue,
            config,
        }
    }

    /// Reads and processes one batch of notices.
    ///
    /// Returns the number of notices handled.
    pub async fn poll_once(&self) -> Result<usize, QueueError> {
        let notices = self
            .queue
            .read(self.config.read_batch, self.config.visibility_timeout)
            .await?;

        let count = notices.len();
        for received in notices {
            self.handle_notice(received).await;
        }

        Ok(count)
    }

    /// Runs until a shutdown signal arrives.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Notice consumer started");

        loop {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!("Notice consumer received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.poll_once().await {
                Ok(0) => {
                    debug!("No notices available");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(count) => {
                    debug!(count = count, "Processed notice batch");
                }
                Err(e) => {
                    error!(error = %e, "Failed to read delivery queue");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!("Notice consumer stopped");
    }

    /// Processes one notice and acknowledges it.
    async fn handle_notice(&self, received: ReceivedNotice) {
        let ReceivedNotice { msg_id, notice } = received;

        match self
            .service
            .process_job(
                notice.job_id,
                &notice.job_type,
                notice.user_id,
                notice.job_parameters,
            )
            .await
        {
            Ok(()) => {
                // Execution failures are recorded on the job row, so the
                // notice is consumed either way.
                if let Err(e) = self.queue.delete(msg_id).await {
                    warn!(
                        job_id = %notice.job_id,
                        msg_id = %msg_id,
                        error = %e,
                        "Failed to acknowledge notice; it will redeliver"
                    );
                }
            }
            Err(e) => {
                error!(
                    job_id = %notice.job_id,
                    error = %e,
                    "Storage failure during processing; leaving notice for redelivery"
                );
            }
        }
    }
}
