//! In-memory fakes for the store, queue and invoker seams.
//!
//! The lifecycle service and recovery sweeper only see the trait
//! contracts, so these fakes let the tests drive full orchestration flows
//! without Postgres or Redis.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use jobforge::dispatch::{DispatchError, RemoteInvoker};
use jobforge::job::{Job, JobStatus, JobType};
use jobforge::queue::{DeliveryNotice, DeliveryQueue, QueueError, ReceivedNotice};
use jobforge::store::{JobFilter, JobStore, StoreError};

/// In-memory implementation of [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pre-built job, overwriting any existing row.
    ///
    /// Lets tests craft rows with specific timestamps or retry counts.
    pub fn insert(&self, job: Job) {
        self.jobs.lock().expect("lock poisoned").insert(job.id, job);
    }

    /// Fetches a job without owner scoping, for assertions.
    pub fn snapshot(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.lock().expect("lock poisoned").get(&job_id).cloned()
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(
        &self,
        job_type: JobType,
        user_id: Uuid,
        job_parameters: serde_json::Value,
    ) -> Result<Job, StoreError> {
        let job = Job::new(job_type, user_id, job_parameters);
        self.insert(job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: Uuid, user_id: Option<Uuid>) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.lock().expect("lock poisoned");
        Ok(jobs
            .get(&job_id)
            .filter(|job| user_id.is_none() || user_id == Some(job.user_id))
            .cloned())
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        if let Some(job) = jobs.get_mut(&job_id) {
            job.status = status;
            job.updated_at = Utc::now();
            if started_at.is_some() {
                job.started_at = started_at;
            }
            if completed_at.is_some() {
                job.completed_at = completed_at;
            }
        }
        Ok(())
    }

    async fn begin_processing(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.started_at = Some(started_at);
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn store_error(
        &self,
        job_id: Uuid,
        message: &str,
        error_type: &str,
        context: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        if let Some(job) = jobs.get_mut(&job_id) {
            job.error_message = Some(message.to_string());
            job.error_type = Some(error_type.to_string());
            job.error_context = Some(context.unwrap_or_else(|| serde_json::json!({})));
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn store_result(
        &self,
        job_id: Uuid,
        data_references: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        if let Some(job) = jobs.get_mut(&job_id) {
            job.data_references = Some(data_references);
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list(&self, user_id: Uuid, filter: &JobFilter) -> Result<(Vec<Job>, i64), StoreError> {
        let jobs = self.jobs.lock().expect("lock poisoned");

        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .filter(|job| filter.status.map_or(true, |s| job.status == s))
            .filter(|job| filter.job_type.map_or(true, |t| job.job_type == t))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Job>, StoreError> {
        let cutoff = Utc::now() - older_than;
        let jobs = self.jobs.lock().expect("lock poisoned");
        Ok(jobs
            .values()
            .filter(|job| job.status == JobStatus::Processing && job.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn find_orphaned(&self, older_than: Duration) -> Result<Vec<Job>, StoreError> {
        let cutoff = Utc::now() - older_than;
        let jobs = self.jobs.lock().expect("lock poisoned");
        Ok(jobs
            .values()
            .filter(|job| {
                job.status == JobStatus::Pending
                    && job.created_at < cutoff
                    && job.retry_count < 2
            })
            .cloned()
            .collect())
    }
}

/// In-memory implementation of [`DeliveryQueue`] with visibility parking.
#[derive(Default)]
pub struct MemoryQueue {
    visible: Mutex<VecDeque<(Uuid, DeliveryNotice)>>,
    inflight: Mutex<HashMap<Uuid, (DeliveryNotice, DateTime<Utc>)>>,
    fail_sends: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `send` fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Number of currently-visible notices.
    pub fn visible_len(&self) -> usize {
        self.visible.lock().expect("lock poisoned").len()
    }

    /// Number of read-but-unacknowledged notices.
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl DeliveryQueue for MemoryQueue {
    async fn send(&self, notice: DeliveryNotice) -> Result<Uuid, QueueError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(QueueError::ConnectionFailed("send disabled".to_string()));
        }

        let msg_id = Uuid::new_v4();
        self.visible
            .lock()
            .expect("lock poisoned")
            .push_back((msg_id, notice));
        Ok(msg_id)
    }

    async fn read(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedNotice>, QueueError> {
        let now = Utc::now();

        // Redeliver anything whose visibility window elapsed. Locks are
        // taken one at a time to keep the ordering consistent.
        let expired: Vec<(Uuid, DeliveryNotice)> = {
            let mut inflight = self.inflight.lock().expect("lock poisoned");
            let ids: Vec<Uuid> = inflight
                .iter()
                .filter(|(_, (_, deadline))| *deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| inflight.remove(&id).map(|(notice, _)| (id, notice)))
                .collect()
        };

        let popped: Vec<(Uuid, DeliveryNotice)> = {
            let mut visible = self.visible.lock().expect("lock poisoned");
            for entry in expired {
                visible.push_back(entry);
            }

            let take = max_messages.min(visible.len());
            visible.drain(..take).collect()
        };

        let deadline = now + visibility_timeout;
        let mut received = Vec::new();

        let mut inflight = self.inflight.lock().expect("lock poisoned");
        for (msg_id, notice) in popped {
            inflight.insert(msg_id, (notice.clone(), deadline));
            received.push(ReceivedNotice { msg_id, notice });
        }

        Ok(received)
    }

    async fn delete(&self, msg_id: Uuid) -> Result<bool, QueueError> {
        if self
            .inflight
            .lock()
            .expect("lock poisoned")
            .remove(&msg_id)
            .is_some()
        {
            return Ok(true);
        }

        let mut visible = self.visible.lock().expect("lock poisoned");
        let before = visible.len();
        visible.retain(|(id, _)| *id != msg_id);
        Ok(visible.len() < before)
    }
}

/// A recorded spawn request.
#[derive(Debug, Clone)]
pub struct SpawnCall {
    pub application: String,
    pub function: String,
    pub payload: serde_json::Value,
}

/// [`RemoteInvoker`] that records calls instead of invoking anything.
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<SpawnCall>>,
    fail: AtomicBool,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `spawn` fail.
    pub fn fail_spawns(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Returns all recorded spawn calls.
    pub fn calls(&self) -> Vec<SpawnCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl RemoteInvoker for RecordingInvoker {
    async fn spawn(
        &self,
        application: &str,
        function: &str,
        payload: serde_json::Value,
    ) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("spawn disabled".to_string()));
        }

        self.calls.lock().expect("lock poisoned").push(SpawnCall {
            application: application.to_string(),
            function: function.to_string(),
            payload,
        });
        Ok(())
    }
}
