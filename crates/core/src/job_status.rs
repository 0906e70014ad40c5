//! Canonical job status model shared by the push and poll transports.
//!
//! Every status string the server can report is mapped onto the closed
//! [`JobStatus`] set by [`JobStatus::from_wire`]. Strings outside the
//! known vocabulary become a terminal [`JobErrorKind::UnknownStatus`]
//! failure carrying the raw value; nothing is silently dropped.

use std::fmt;

use chrono::Utc;
use serde::Serialize;

use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Wire status labels
// ---------------------------------------------------------------------------

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_DUPLICATE: &str = "duplicate";

/// Queue-backend spellings that mean the job has not started yet.
const QUEUED_ALIASES: &[&str] = &[STATUS_QUEUED, "deferred", "scheduled"];

/// Queue-backend spellings that mean a worker picked the job up.
const PROCESSING_ALIASES: &[&str] = &[STATUS_PROCESSING, "started", "running"];

const COMPLETED_ALIASES: &[&str] = &[STATUS_COMPLETED, "finished"];

/// The job was stopped on the server before it produced a result.
const CANCELLED_ALIASES: &[&str] = &["stopped", "canceled", "cancelled"];

const DEFAULT_FAILURE_MESSAGE: &str = "Ingestion failed";

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResult {
    /// Name of the ingested source document.
    pub source: String,
    /// Number of chunks the pipeline produced.
    pub chunks: u32,
}

impl IngestResult {
    pub fn new(source: impl Into<String>, chunks: u32) -> Self {
        Self {
            source: source.into(),
            chunks,
        }
    }
}

/// Classification of a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The server reported the job as failed.
    Reported,
    /// The job identifier is unknown or its retention window elapsed.
    NotFound,
    /// The server reported a status outside the known vocabulary.
    UnknownStatus { raw: String },
    /// A server response matched none of the agreed shapes.
    ContractViolation,
    /// The submission request itself failed.
    Submission,
    /// The caller-configured tracking deadline elapsed.
    Timeout,
    /// The job was stopped or cancelled on the server.
    Cancelled,
}

impl JobErrorKind {
    /// Stable machine-readable code for this failure class.
    pub fn code(&self) -> &'static str {
        match self {
            JobErrorKind::Reported => "JOB_FAILED",
            JobErrorKind::NotFound => "JOB_NOT_FOUND",
            JobErrorKind::UnknownStatus { .. } => "UNKNOWN_STATUS",
            JobErrorKind::ContractViolation => "CONTRACT_VIOLATION",
            JobErrorKind::Submission => "SUBMIT_FAILED",
            JobErrorKind::Timeout => "TRACKING_TIMEOUT",
            JobErrorKind::Cancelled => "JOB_CANCELLED",
        }
    }
}

/// A terminal failure with its human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure reported verbatim by the server.
    pub fn reported(message: impl Into<String>) -> Self {
        Self::new(JobErrorKind::Reported, message)
    }

    /// Synthetic failure for an identifier the server no longer knows.
    pub fn not_found() -> Self {
        Self::new(JobErrorKind::NotFound, "Job not found or expired")
    }

    /// Synthetic failure preserving an unrecognised status string.
    pub fn unknown_status(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let message = format!("Server reported unrecognised job status '{raw}'");
        Self::new(JobErrorKind::UnknownStatus { raw }, message)
    }

    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(JobErrorKind::ContractViolation, message)
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::new(
            JobErrorKind::Timeout,
            format!("Job did not finish within {after_secs}s"),
        )
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

/// Reference to a resource that already holds the same content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateOf {
    /// Name or id of the pre-existing resource, when the server names it.
    pub existing: Option<String>,
    /// Server-provided explanation, if any.
    pub message: Option<String>,
}

impl DuplicateOf {
    /// One-line explanation, preferring the server's own wording.
    pub fn summary(&self) -> String {
        match (&self.message, &self.existing) {
            (Some(message), _) => message.clone(),
            (None, Some(existing)) => format!("Document already ingested as {existing}"),
            (None, None) => "Document already ingested".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// The closed set of job states.
///
/// `Queued` and `Processing` are the only non-terminal states; once a
/// job reaches any other state no further transitions are valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing {
        /// Free-form pipeline stage (e.g. `"parsing"`), display only.
        step: Option<String>,
    },
    Completed(IngestResult),
    Failed(JobError),
    Duplicate(DuplicateOf),
}

/// Loosely-typed status report as it arrives from either transport.
///
/// Field names follow the push message; the poll response is
/// flattened into the same shape before mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireStatus {
    pub status: String,
    pub step: Option<String>,
    pub source: Option<String>,
    pub chunks: Option<u32>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub duplicate_of: Option<String>,
}

impl WireStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }
}

impl JobStatus {
    /// Whether no further transitions are valid from this state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Processing { .. })
    }

    /// Canonical lower-case label of this state.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Queued => STATUS_QUEUED,
            JobStatus::Processing { .. } => STATUS_PROCESSING,
            JobStatus::Completed(_) => STATUS_COMPLETED,
            JobStatus::Failed(_) => STATUS_FAILED,
            JobStatus::Duplicate(_) => STATUS_DUPLICATE,
        }
    }

    /// Processing step, if the server reported one.
    pub fn step(&self) -> Option<&str> {
        match self {
            JobStatus::Processing { step } => step.as_deref(),
            _ => None,
        }
    }

    /// One human-readable line describing this state.
    pub fn summary(&self) -> String {
        match self {
            JobStatus::Queued => "Queued".to_string(),
            JobStatus::Processing { step: Some(step) } => format!("Processing ({step})"),
            JobStatus::Processing { step: None } => "Processing".to_string(),
            JobStatus::Completed(result) => {
                format!("Ingested {} ({} chunks)", result.source, result.chunks)
            }
            JobStatus::Failed(err) => err.message.clone(),
            JobStatus::Duplicate(dup) => dup.summary(),
        }
    }

    /// Map a wire report onto the closed state set.
    ///
    /// Matching is case-insensitive. A completed report without a
    /// result and any unrecognised status both map to `Failed`.
    pub fn from_wire(report: WireStatus) -> Self {
        let normalized = report.status.trim().to_ascii_lowercase();
        let status = normalized.as_str();

        if QUEUED_ALIASES.contains(&status) {
            JobStatus::Queued
        } else if PROCESSING_ALIASES.contains(&status) {
            JobStatus::Processing {
                step: report.step.filter(|s| !s.trim().is_empty()),
            }
        } else if COMPLETED_ALIASES.contains(&status) {
            match (report.source, report.chunks) {
                (Some(source), Some(chunks)) => {
                    JobStatus::Completed(IngestResult { source, chunks })
                }
                _ => JobStatus::Failed(JobError::contract_violation(
                    "Completed status reported without a result",
                )),
            }
        } else if status == STATUS_FAILED {
            let message = report
                .error
                .or(report.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            JobStatus::Failed(JobError::reported(message))
        } else if status == STATUS_DUPLICATE {
            JobStatus::Duplicate(DuplicateOf {
                existing: report.duplicate_of.or(report.source),
                message: report.message,
            })
        } else if CANCELLED_ALIASES.contains(&status) {
            JobStatus::Failed(JobError::new(
                JobErrorKind::Cancelled,
                report
                    .error
                    .unwrap_or_else(|| "Job was cancelled on the server".to_string()),
            ))
        } else {
            JobStatus::Failed(JobError::unknown_status(report.status))
        }
    }
}

// ---------------------------------------------------------------------------
// StatusEvent
// ---------------------------------------------------------------------------

/// A status notification produced by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    /// When the client received the notification (UTC).
    pub received_at: Timestamp,
}

impl StatusEvent {
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            received_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
