//! Wiring for a production ingestion client.
//!
//! [`IngestManager`] builds the HTTP API wrapper, the WebSocket
//! connector, both transports and the submission gateway from one
//! [`ClientConfig`], and hands out trackers that share them.

use std::sync::Arc;

use anclora_core::upload::UploadRequest;

use crate::api::{IngestApi, IngestApiError};
use crate::client::WsConnector;
use crate::config::ClientConfig;
use crate::gateway::{SubmissionGateway, SubmitError, Submission};
use crate::observer::JobObserver;
use crate::poll::PollClient;
use crate::push::PushChannelClient;
use crate::session::StatusSource;
use crate::tracker::{JobTracker, TrackerConfig};

/// Shared transports and gateway for one ingestion server.
///
/// Cheap to keep around for the lifetime of the process; each tracked
/// job gets its own [`JobTracker`] from [`tracker`](Self::tracker).
pub struct IngestManager {
    gateway: SubmissionGateway,
    push: Arc<dyn StatusSource>,
    poll: Arc<dyn StatusSource>,
    tracker_config: TrackerConfig,
}

impl IngestManager {
    pub fn from_config(config: &ClientConfig) -> Result<Self, IngestApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        let api = Arc::new(IngestApi::with_client(http, config.api_url.clone()));

        let connector = Arc::new(WsConnector::new(config.ws_url.clone()));
        let push = Arc::new(PushChannelClient::new(connector, config.push_settings()));
        let poll = Arc::new(PollClient::new(api.clone(), config.poll_interval));

        tracing::info!(
            api_url = %config.api_url,
            ws_url = %config.ws_url,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Ingestion client ready",
        );

        Ok(Self {
            gateway: SubmissionGateway::new(api, config.max_upload_bytes),
            push,
            poll,
            tracker_config: config.tracker_config(),
        })
    }

    /// Validate and send a document.
    pub async fn submit(&self, upload: &UploadRequest) -> Result<Submission, SubmitError> {
        self.gateway.submit(upload).await
    }

    /// A fresh tracker reporting to `observer`.
    pub fn tracker(&self, observer: Arc<dyn JobObserver>) -> JobTracker {
        JobTracker::new(
            Arc::clone(&self.push),
            Arc::clone(&self.poll),
            observer,
            self.tracker_config.clone(),
        )
    }

    pub fn tracker_config(&self) -> &TrackerConfig {
        &self.tracker_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_from_default_config() {
        let manager = IngestManager::from_config(&ClientConfig::default()).unwrap();
        assert_eq!(manager.tracker_config().tracking_timeout, None);
    }
}
