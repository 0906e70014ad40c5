//! REST API client for the ingestion HTTP endpoints.
//!
//! Wraps document submission (`POST /ingest`) and job status lookup
//! (`GET /ingest/status/{job_id}`) using [`reqwest`]. [`IngestApi`] is
//! also the production [`StatusFetcher`] and [`Submitter`].

use anclora_core::job_events::{POLL_STATUS_PATH, SUBMIT_PATH};
use anclora_core::job_status::{WireStatus, STATUS_DUPLICATE};
use anclora_core::types::{JobId, Timestamp};
use anclora_core::upload::UploadRequest;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};

use crate::client::ClientError;
use crate::gateway::Submitter;
use crate::poll::StatusFetcher;

/// HTTP client for one ingestion server.
pub struct IngestApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body returned by `POST /ingest`.
///
/// The server answers either inline (`file` + `chunks`) or with a
/// queued `job_id`; classification lives in the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    pub file: Option<String>,
    pub chunks: Option<u32>,
    /// Older servers report the count under this name.
    pub chunk_count: Option<u32>,
    pub status: Option<String>,
    pub job_id: Option<String>,
    pub message: Option<String>,
}

impl SubmitResponse {
    pub fn chunks(&self) -> Option<u32> {
        self.chunks.or(self.chunk_count)
    }
}

/// Body returned by `GET /ingest/status/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub ended_at: Option<Timestamp>,
    pub result: Option<JobResultBody>,
    pub error: Option<String>,
}

/// Result block of a finished job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobResultBody {
    pub file: String,
    pub chunks: Option<u32>,
    pub chunk_count: Option<u32>,
    /// Worker-level outcome, e.g. `"duplicate"`.
    pub status: Option<String>,
}

impl JobStatusResponse {
    /// Flatten into the transport-neutral status report.
    ///
    /// A finished job whose result says `duplicate` is reported as a
    /// duplicate rather than a completion.
    pub fn into_wire(self) -> WireStatus {
        let mut wire = WireStatus::new(self.status);
        wire.error = self.error;

        if let Some(result) = self.result {
            let duplicate = result
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(STATUS_DUPLICATE));
            if duplicate {
                wire.status = STATUS_DUPLICATE.to_string();
                wire.duplicate_of = Some(result.file.clone());
            }
            wire.chunks = result.chunks.or(result.chunk_count);
            wire.source = Some(result.file);
        }
        wire
    }
}

/// Errors from the ingestion REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum IngestApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The job is unknown or its retention window elapsed.
    #[error("Job {0} not found or expired")]
    NotFound(String),

    /// The server returned a non-2xx status code.
    #[error("Ingestion API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<IngestApiError> for ClientError {
    fn from(err: IngestApiError) -> Self {
        match err {
            IngestApiError::Request(e) => ClientError::Request(e.to_string()),
            IngestApiError::NotFound(id) => ClientError::NotFound(id),
            IngestApiError::ApiError { status, body } => ClientError::Api { status, body },
        }
    }
}

impl IngestApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8030`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for sharing timeouts and connection pools).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Upload a document for ingestion.
    ///
    /// Sends a multipart `POST /ingest` with the document in the `file`
    /// field.
    pub async fn submit(&self, upload: &UploadRequest) -> Result<SubmitResponse, IngestApiError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(SUBMIT_PATH))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the current status of a queued job.
    ///
    /// A 404 becomes [`IngestApiError::NotFound`].
    pub async fn get_status(&self, job_id: &JobId) -> Result<JobStatusResponse, IngestApiError> {
        let response = self
            .client
            .get(format!("{}/{}", self.url(POLL_STATUS_PATH), job_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IngestApiError::NotFound(job_id.to_string()));
        }

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`IngestApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, IngestApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(IngestApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, IngestApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl StatusFetcher for IngestApi {
    async fn fetch_status(&self, job_id: &JobId) -> Result<WireStatus, ClientError> {
        Ok(self.get_status(job_id).await?.into_wire())
    }
}

#[async_trait]
impl Submitter for IngestApi {
    async fn submit(&self, upload: &UploadRequest) -> Result<SubmitResponse, ClientError> {
        Ok(IngestApi::submit(self, upload).await?)
    }
}

/// Accept RFC 3339 timestamps as well as the offset-less ISO format
/// some queue backends emit (interpreted as UTC). Anything else is
/// treated as absent rather than failing the whole response.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }))
}
