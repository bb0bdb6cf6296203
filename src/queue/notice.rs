//! Delivery notice types.
//!
//! A notice announces that a job is ready for a worker to pick up. Notices
//! are ephemeral queue messages, not domain entities: the job row in the
//! store is the durable record, the notice only carries enough to start
//! processing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobType;

/// Message announcing a dispatchable job.
///
/// `job_type` travels as its wire tag: a worker may receive a tag this
/// build does not recognize, which is handled as a runtime failure at
/// processing time rather than a deserialization error here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryNotice {
    /// The job this notice announces.
    pub job_id: Uuid,
    /// Wire tag of the job type.
    pub job_type: String,
    /// Owner of the job.
    pub user_id: Uuid,
    /// Input payload, forwarded verbatim to the worker.
    pub job_parameters: serde_json::Value,
}

impl DeliveryNotice {
    /// Creates a notice for a job.
    pub fn new(
        job_id: Uuid,
        job_type: JobType,
        user_id: Uuid,
        job_parameters: serde_json::Value,
    ) -> Self {
        Self {
            job_id,
            job_type: job_type.as_str().to_string(),
            user_id,
            job_parameters,
        }
    }
}

/// Wire envelope stored in Redis: the notice plus its queue-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NoticeEnvelope {
    /// Queue-assigned message id, used for acknowledgment.
    pub msg_id: Uuid,
    pub job_id: Uuid,
    pub job_type: String,
    pub user_id: Uuid,
    pub job_parameters: serde_json::Value,
}

impl NoticeEnvelope {
    /// Wraps a notice with a fresh message id.
    pub fn wrap(notice: DeliveryNotice) -> Self {
        Self {
            msg_id: Uuid::new_v4(),
            job_id: notice.job_id,
            job_type: notice.job_type,
            user_id: notice.user_id,
            job_parameters: notice.job_parameters,
        }
    }

    /// Unwraps into the consumer-facing form.
    pub fn into_received(self) -> ReceivedNotice {
        ReceivedNotice {
            msg_id: self.msg_id,
            notice: DeliveryNotice {
                job_id: self.job_id,
                job_type: self.job_type,
                user_id: self.user_id,
                job_parameters: self.job_parameters,
            },
        }
    }
}

/// A notice handed to a consumer, carrying the id needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct ReceivedNotice {
    /// Message id to pass to `DeliveryQueue::delete`.
    pub msg_id: Uuid,
    /// The delivered notice.
    pub notice: DeliveryNotice,
}
