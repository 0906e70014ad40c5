//! Poll session: fetch the job status on a fixed interval.
//!
//! The first request goes out immediately; later ones follow every
//! `interval` and never overlap. A not-found answer becomes a terminal
//! `Failed` event and ends the session; every other error is reported
//! and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use anclora_core::job_status::{JobError, JobStatus, StatusEvent, WireStatus};
use anclora_core::types::JobId;
use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::ClientError;
use crate::events::{SignalSender, SignalTx};
use crate::session::{StatusSource, TransportKind, TransportSession};

/// Default delay between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest poll period accepted; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Point-in-time status lookup.
///
/// Implementations return [`ClientError::NotFound`] once the server no
/// longer knows the job.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<WireStatus, ClientError>;
}

/// Pull-based [`StatusSource`].
pub struct PollClient {
    fetcher: Arc<dyn StatusFetcher>,
    interval: Duration,
}

impl PollClient {
    pub fn new(fetcher: Arc<dyn StatusFetcher>, interval: Duration) -> Self {
        Self {
            fetcher,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl StatusSource for PollClient {
    fn kind(&self) -> TransportKind {
        TransportKind::Poll
    }

    fn start(&self, job_id: JobId, tx: SignalTx) -> TransportSession {
        let fetcher = Arc::clone(&self.fetcher);
        let interval = self.interval;
        let session_job = job_id.clone();

        TransportSession::spawn(TransportKind::Poll, job_id, tx, move |signals, cancel| {
            run_poll_session(fetcher, session_job, interval, signals, cancel)
        })
    }
}

/// Tick loop. Exits on cancellation or right after a terminal event.
async fn run_poll_session(
    fetcher: Arc<dyn StatusFetcher>,
    job_id: JobId,
    interval: Duration,
    signals: SignalSender,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        tick += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = fetcher.fetch_status(&job_id) => result,
        };

        let status = match result {
            Ok(wire) => JobStatus::from_wire(wire),
            Err(ClientError::NotFound(_)) => {
                tracing::warn!(job_id = %job_id, tick, "Job not found or expired, stopping poll");
                JobStatus::Failed(JobError::not_found())
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, tick, error = %e, "Status poll failed, retrying next tick");
                signals.transport_error(e);
                continue;
            }
        };

        let terminal = status.is_terminal();
        tracing::debug!(job_id = %job_id, tick, status = status.label(), "Polled status");

        if terminal {
            // Stop before anyone sees the terminal event.
            cancel.cancel();
        }
        signals.status(StatusEvent::new(job_id.clone(), status));
        if terminal {
            return;
        }
    }
}
