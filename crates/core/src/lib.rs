//! Shared domain types for the anclora ingestion client.
//!
//! Holds the job status model both transports normalise into, the
//! upload validation rules applied before submission, and the wire
//! constants of the push channel.

pub mod error;
pub mod job_events;
pub mod job_status;
pub mod types;
pub mod upload;
