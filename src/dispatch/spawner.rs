//! Job dispatch to remote workers.
//!
//! The dispatcher resolves a job type to a named worker function and asks
//! the remote side to accept the work item. Invocation is fire-and-forget:
//! a successful `spawn` means the work was accepted, not that it finished.
//! The worker later reports back through the lifecycle service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::job::JobType;

/// Errors that can occur while requesting remote execution.
///
/// A dispatch failure never rolls back the already-created job row or
/// delivery notice; the recovery sweeper compensates later.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The remote side rejected the invocation request.
    #[error("Worker invocation rejected by {application}/{function}: {reason}")]
    Rejected {
        application: String,
        function: String,
        reason: String,
    },

    /// The invocation request could not reach the remote side.
    #[error("Worker invocation transport failed: {0}")]
    Transport(String),
}

/// Capability for asynchronous, fire-and-forget remote invocation.
///
/// The physical transport is out of scope for the lifecycle core; tests
/// substitute a recording fake.
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    /// Requests that `application`/`function` accept the work item.
    ///
    /// Returns once the remote side has accepted it.
    async fn spawn(
        &self,
        application: &str,
        function: &str,
        payload: serde_json::Value,
    ) -> Result<(), DispatchError>;
}

/// Resolves job types to worker functions and requests their execution.
pub struct Dispatcher {
    invoker: Arc<dyn RemoteInvoker>,
    /// Remote application name, derived from the deployment environment.
    application: String,
}

impl Dispatcher {
    /// Creates a dispatcher targeting the worker application for the given
    /// deployment environment.
    pub fn new(invoker: Arc<dyn RemoteInvoker>, environment: &str) -> Self {
        Self {
            invoker,
            application: format!("job-worker-{}", environment),
        }
    }

    /// Returns the resolved remote application name.
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Requests asynchronous execution of a job.
    ///
    /// The worker function is resolved from the job type's static mapping;
    /// the mapping is total, so there is no fallback path.
    pub async fn spawn(
        &self,
        job_id: Uuid,
        job_type: JobType,
        user_id: Uuid,
        job_parameters: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let function = job_type.worker_function();

        let payload = json!({
            "job_id": job_id,
            "job_type": job_type,
            "user_id": user_id,
            "job_parameters": job_parameters,
        });

        self.invoker
            .spawn(&self.application, function, payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records spawn calls instead of invoking anything.
    struct RecordingInvoker {
        calls: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    #[async_trait]
    impl RemoteInvoker for RecordingInvoker {
        async fn spawn(
            &self,
            application: &str,
            function: &str,
            payload: serde_json::Value,
        ) -> Result<(), DispatchError> {
            self.calls.lock().expect("lock poisoned").push((
                application.to_string(),
                function.to_string(),
                payload,
            ));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawn_resolves_application_and_function() {
        let invoker = Arc::new(RecordingInvoker {
            calls: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::new(invoker.clone(), "develop");

        let job_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        dispatcher
            .spawn(
                job_id,
                JobType::SampleTask,
                user_id,
                &serde_json::json!({"n": 1}),
            )
            .await
            .expect("spawn should succeed");

        let calls = invoker.calls.lock().expect("lock poisoned");
        assert_eq!(calls.len(), 1);

        let (application, function, payload) = &calls[0];
        assert_eq!(application, "job-worker-develop");
        assert_eq!(function, "process_sample_job");
        assert_eq!(payload["job_id"], serde_json::json!(job_id));
        assert_eq!(payload["job_type"], serde_json::json!("sample_task"));
    }

    #[test]
    fn test_application_name_follows_environment() {
        let invoker = Arc::new(RecordingInvoker {
            calls: Mutex::new(Vec::new()),
        });

        let dispatcher = Dispatcher::new(invoker, "production");
        assert_eq!(dispatcher.application(), "job-worker-production");
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::Rejected {
            application: "job-worker-develop".to_string(),
            function: "process_sample_job".to_string(),
            reason: "503 Service Unavailable".to_string(),
        };
        assert!(err.to_string().contains("process_sample_job"));
        assert!(err.to_string().contains("503"));

        let err = DispatchError::Transport("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
