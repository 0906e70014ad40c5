//! Submission gateway: validate an upload, send it, classify the answer.
//!
//! The ingestion endpoint answers in one of two shapes. Small documents
//! are processed inline and the response carries the result directly;
//! larger ones are queued and the response carries a `job_id` to track.
//! Anything else is a contract violation and is never accepted silently.

use std::sync::Arc;

use anclora_core::error::CoreError;
use anclora_core::job_status::{
    IngestResult, JobError, JobErrorKind, STATUS_PROCESSING, STATUS_QUEUED,
};
use anclora_core::types::JobId;
use anclora_core::upload::UploadRequest;
use async_trait::async_trait;

use crate::api::SubmitResponse;
use crate::client::ClientError;

/// Sends an upload to the ingestion endpoint.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, upload: &UploadRequest) -> Result<SubmitResponse, ClientError>;
}

/// How the server accepted a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Processed inline; nothing left to track.
    Sync(IngestResult),
    /// Queued; follow the job to learn the outcome.
    Async(JobId),
}

/// Errors from the submission step.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid upload: {0}")]
    Invalid(#[from] CoreError),

    #[error("Submission failed: {0}")]
    Request(#[from] ClientError),

    #[error("Unexpected submission response: {0}")]
    ContractViolation(String),
}

impl SubmitError {
    /// Terminal failure reported to observers for this error.
    pub fn to_job_error(&self) -> JobError {
        match self {
            SubmitError::ContractViolation(msg) => JobError::contract_violation(msg.clone()),
            other => JobError::new(JobErrorKind::Submission, other.to_string()),
        }
    }
}

/// Front door for new ingestion jobs.
pub struct SubmissionGateway {
    submitter: Arc<dyn Submitter>,
    max_upload_bytes: u64,
}

impl SubmissionGateway {
    pub fn new(submitter: Arc<dyn Submitter>, max_upload_bytes: u64) -> Self {
        Self {
            submitter,
            max_upload_bytes,
        }
    }

    /// Validate `upload` locally, send it once, and classify the response.
    ///
    /// No retries: a failed request is returned as
    /// [`SubmitError::Request`].
    pub async fn submit(&self, upload: &UploadRequest) -> Result<Submission, SubmitError> {
        upload.validate(self.max_upload_bytes)?;

        tracing::info!(
            file_name = %upload.file_name,
            content_type = %upload.content_type,
            size = upload.size(),
            "Submitting document",
        );

        let response = self.submitter.submit(upload).await.map_err(|e| {
            tracing::warn!(file_name = %upload.file_name, error = %e, "Submission request failed");
            e
        })?;

        let submission = classify(response)?;
        match &submission {
            Submission::Async(job_id) => {
                tracing::info!(job_id = %job_id, "Document queued for ingestion");
            }
            Submission::Sync(result) => {
                tracing::info!(source = %result.source, chunks = result.chunks, "Document ingested inline");
            }
        }
        Ok(submission)
    }
}

/// Map a raw submit response onto [`Submission`].
pub fn classify(response: SubmitResponse) -> Result<Submission, SubmitError> {
    if let Some(raw) = response.job_id.as_deref() {
        return JobId::new(raw)
            .map(Submission::Async)
            .map_err(|_| SubmitError::ContractViolation("response carried an empty job_id".into()));
    }

    if let Some(status) = response.status.as_deref() {
        if status.eq_ignore_ascii_case(STATUS_QUEUED)
            || status.eq_ignore_ascii_case(STATUS_PROCESSING)
        {
            return Err(SubmitError::ContractViolation(format!(
                "status '{status}' without a job_id"
            )));
        }
    }

    match (response.file.as_deref(), response.chunks()) {
        (Some(file), Some(chunks)) if !file.trim().is_empty() => {
            Ok(Submission::Sync(IngestResult::new(file, chunks)))
        }
        _ => Err(SubmitError::ContractViolation(
            "response has neither a job_id nor an inline result".into(),
        )),
    }
}
