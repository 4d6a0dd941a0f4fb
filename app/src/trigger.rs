//! HTTP classification trigger.
//!
//! Posts `{ticket_id, description}` to the classifier. Any 2xx answer means
//! the job was accepted; the result itself arrives through the record store.

use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use support_copilot_core::trigger::{ClassificationJob, ClassificationTrigger, TriggerError};

/// Trigger backed by the classifier's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpClassificationTrigger {
    client: Client,
    url: String,
}

impl HttpClassificationTrigger {
    /// Create a trigger posting to `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Create a trigger with a preconfigured client
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Endpoint jobs are posted to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ClassificationTrigger for HttpClassificationTrigger {
    fn trigger(
        &self,
        job: ClassificationJob,
    ) -> Pin<Box<dyn Future<Output = Result<(), TriggerError>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&job)
                .send()
                .await
                .map_err(|e| TriggerError::Unreachable(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                tracing::debug!(ticket_id = %job.ticket_id, "Classification requested");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            tracing::warn!(ticket_id = %job.ticket_id, %status, "Classifier rejected the job");
            Err(TriggerError::Rejected {
                status: status.as_u16(),
                body,
            })
        })
    }
}
