//! Push channel message types and parser.
//!
//! The server sends flat JSON objects discriminated by a `type` field,
//! e.g. `{"type": "job_update", "job_id": "...", "status": "processing",
//! "step": "parsing"}`. This module deserializes them into a
//! strongly-typed [`PushMessage`] enum.

use anclora_core::job_status::WireStatus;
use serde::Deserialize;

/// All known push channel message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    /// The server accepted the channel.
    #[serde(rename = "connected")]
    Connected(ConnectedData),

    /// The tracked job changed status.
    #[serde(rename = "job_update")]
    JobUpdate(JobUpdateData),
}

/// Payload for `connected` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedData {
    pub job_id: Option<String>,
    pub message: Option<String>,
}

/// Payload for `job_update` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct JobUpdateData {
    /// Absent on some server versions; the channel is already keyed by job.
    pub job_id: Option<String>,
    pub status: String,
    pub step: Option<String>,
    /// Name of the ingested document (completed / duplicate updates).
    pub filename: Option<String>,
    pub chunks: Option<u32>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub duplicate_of: Option<String>,
}

impl JobUpdateData {
    /// Flatten into the transport-neutral status report.
    pub fn into_wire(self) -> WireStatus {
        WireStatus {
            status: self.status,
            step: self.step,
            source: self.filename,
            chunks: self.chunks,
            error: self.error,
            message: self.message,
            duplicate_of: self.duplicate_of,
        }
    }
}

/// Parse a push channel text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log them and continue.
pub fn parse_message(text: &str) -> Result<PushMessage, serde_json::Error> {
    serde_json::from_str(text)
}
