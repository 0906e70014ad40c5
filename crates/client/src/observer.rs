//! Callbacks through which a tracked job reports to its owner.

use anclora_core::job_status::{DuplicateOf, IngestResult, JobError, StatusEvent};

use crate::client::ClientError;

/// Why a job finished without a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    Error(JobError),
    /// The server already holds identical content.
    Duplicate(DuplicateOf),
}

impl JobFailure {
    /// The single human-readable message for this failure.
    pub fn message(&self) -> String {
        match self {
            JobFailure::Error(err) => err.message.clone(),
            JobFailure::Duplicate(dup) => dup.summary(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            JobFailure::Error(err) => err.code(),
            JobFailure::Duplicate(_) => "JOB_DUPLICATE",
        }
    }
}

impl From<JobError> for JobFailure {
    fn from(err: JobError) -> Self {
        JobFailure::Error(err)
    }
}

/// Receives the lifecycle of one tracked job.
///
/// Exactly one of `on_success`, `on_failure` or `on_cancelled` is called
/// per tracked job. Callbacks run on the tracker's dispatch task (or on
/// the caller for inline results) and should not block.
pub trait JobObserver: Send + Sync {
    /// The push channel opened (again).
    fn on_connected(&self) {}

    /// A non-terminal status arrived.
    fn on_progress(&self, _event: &StatusEvent) {}

    /// A recoverable transport problem. The job is still being tracked.
    fn on_transport_error(&self, _error: &ClientError) {}

    /// Tracking was cancelled by the caller.
    fn on_cancelled(&self) {}

    fn on_success(&self, result: &IngestResult);

    fn on_failure(&self, failure: &JobFailure);
}
