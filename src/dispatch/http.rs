//! HTTP worker gateway invoker.
//!
//! Implements [`RemoteInvoker`] against a worker gateway that exposes
//! `POST /apps/{application}/functions/{function}/spawn`. Any 2xx response
//! means the work item was accepted for asynchronous execution.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::spawner::{DispatchError, RemoteInvoker};

/// Default timeout for spawn requests. Acceptance should be fast; actual
/// execution happens out of process.
const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote invoker speaking HTTP to a worker gateway.
pub struct HttpInvoker {
    client: Client,
    base_url: String,
}

impl HttpInvoker {
    /// Creates an invoker for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_SPAWN_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Creates an invoker with a caller-supplied client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the gateway base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn spawn_url(&self, application: &str, function: &str) -> String {
        format!(
            "{}/apps/{}/functions/{}/spawn",
            self.base_url, application, function
        )
    }
}

#[async_trait]
impl RemoteInvoker for HttpInvoker {
    async fn spawn(
        &self,
        application: &str,
        function: &str,
        payload: serde_json::Value,
    ) -> Result<(), DispatchError> {
        let url = self.spawn_url(application, function);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::Rejected {
                application: application.to_string(),
                function: function.to_string(),
                reason: format!("{}: {}", status, body),
            })
        }
    }
}
