//! Wire constants for the job push channel.
//!
//! The server addresses every frame with a `type` field; the client
//! only ever sends the opaque liveness text.

/// Sent once by the server right after the channel is accepted.
pub const MSG_TYPE_CONNECTED: &str = "connected";

/// A status change for the tracked job.
pub const MSG_TYPE_JOB_UPDATE: &str = "job_update";

/// Liveness text frame sent by the client while connected.
/// The server is not required to answer it.
pub const HEARTBEAT_PING: &str = "ping";

/// Path prefix of the push channel endpoint (`{ws_base}/ws/jobs/{job_id}`).
pub const PUSH_CHANNEL_PATH: &str = "/ws/jobs";

/// Path prefix of the poll endpoint (`{api_base}/ingest/status/{job_id}`).
pub const POLL_STATUS_PATH: &str = "/ingest/status";

/// Path of the submission endpoint.
pub const SUBMIT_PATH: &str = "/ingest";
