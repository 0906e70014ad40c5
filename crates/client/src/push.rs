//! Push channel session: connect -> process frames -> reconnect.
//!
//! [`PushChannelClient`] opens a persistent channel for one job,
//! translates every `job_update` frame into a [`StatusEvent`], pings
//! the server on a fixed interval while connected, and reopens the
//! channel after the reconnect backoff when it drops unexpectedly.
//!
//! If the very first open fails the session reports
//! [`SignalKind::Unavailable`](crate::events::SignalKind::Unavailable)
//! and ends, leaving the fallback decision to the tracker.

use std::sync::Arc;
use std::time::Duration;

use anclora_core::job_events::HEARTBEAT_PING;
use anclora_core::job_status::{JobStatus, StatusEvent};
use anclora_core::types::JobId;
use futures::{SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, PushConnection, PushConnector};
use crate::events::{SignalSender, SignalTx};
use crate::messages::{parse_message, PushMessage};
use crate::reconnect::{open_once, reconnect_loop, ReconnectConfig};
use crate::session::{StatusSource, TransportKind, TransportSession};

/// Default interval between liveness pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single connection handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a caller-initiated close waits for the close frame to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Shortest heartbeat period accepted; `tokio::time::interval` rejects zero.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Timing parameters of a push session.
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Push-based [`StatusSource`].
pub struct PushChannelClient {
    connector: Arc<dyn PushConnector>,
    settings: PushSettings,
}

impl PushChannelClient {
    pub fn new(connector: Arc<dyn PushConnector>, settings: PushSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }
}

impl StatusSource for PushChannelClient {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    fn start(&self, job_id: JobId, tx: SignalTx) -> TransportSession {
        let connector = Arc::clone(&self.connector);
        let settings = self.settings.clone();
        let session_job = job_id.clone();

        TransportSession::spawn(TransportKind::Push, job_id, tx, move |signals, cancel| {
            run_push_session(connector, session_job, settings, signals, cancel)
        })
    }
}

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// The session was closed by its owner.
    Cancelled,
    /// A terminal status was forwarded; nothing more to wait for.
    Terminal,
    /// The peer closed or the connection failed.
    Dropped,
}

/// Core session loop. Runs until cancelled, until a terminal status
/// is forwarded, or until the very first open fails.
async fn run_push_session(
    connector: Arc<dyn PushConnector>,
    job_id: JobId,
    settings: PushSettings,
    signals: SignalSender,
    cancel: CancellationToken,
) {
    let mut conn = match open_once(&*connector, &job_id, settings.connect_timeout, &cancel).await {
        None => return,
        Some(Ok(conn)) => conn,
        Some(Err(e)) => {
            tracing::warn!(job_id = %job_id, error = %e, "Push channel unavailable");
            cancel.cancel();
            signals.unavailable(e);
            return;
        }
    };

    loop {
        // The close may have raced the handshake.
        if cancel.is_cancelled() {
            return;
        }
        signals.connected();

        match drive_connection(conn, &job_id, &settings, &signals, &cancel).await {
            ConnectionEnd::Cancelled => return,
            ConnectionEnd::Terminal => {
                cancel.cancel();
                return;
            }
            ConnectionEnd::Dropped => {}
        }

        tracing::info!(job_id = %job_id, "Push channel lost, entering reconnect loop");
        conn = match reconnect_loop(
            &*connector,
            &job_id,
            &settings.reconnect,
            settings.connect_timeout,
            &signals,
            &cancel,
        )
        .await
        {
            Some(conn) => conn,
            None => return,
        };
    }
}

/// Process frames from one connection and keep it alive with pings.
async fn drive_connection(
    conn: PushConnection,
    job_id: &JobId,
    settings: &PushSettings,
    signals: &SignalSender,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let PushConnection {
        mut sink,
        mut stream,
    } = conn;

    let period = settings.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                return ConnectionEnd::Cancelled;
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    if handle_text_frame(&text, job_id, signals) {
                        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                        return ConnectionEnd::Terminal;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Push channel receive error");
                    signals.transport_error(e);
                    return ConnectionEnd::Dropped;
                }
                None => {
                    tracing::info!(job_id = %job_id, "Push channel stream exhausted");
                    return ConnectionEnd::Dropped;
                }
            },
            _ = heartbeat.tick() => {
                tracing::debug!(job_id = %job_id, "Push channel heartbeat ping");
                // Fire-and-forget: a failed ping surfaces as a receive error later.
                if let Err(e) = sink.send(HEARTBEAT_PING.to_string()).await {
                    tracing::debug!(job_id = %job_id, error = %e, "Heartbeat ping failed");
                }
            }
        }
    }
}

/// Translate one text frame. Returns `true` if a terminal status was
/// forwarded.
fn handle_text_frame(text: &str, job_id: &JobId, signals: &SignalSender) -> bool {
    match parse_message(text) {
        Ok(PushMessage::Connected(data)) => {
            tracing::debug!(job_id = %job_id, message = ?data.message, "Server acknowledged channel");
            false
        }
        Ok(PushMessage::JobUpdate(update)) => {
            if let Some(other) = update.job_id.as_deref().filter(|id| *id != job_id.as_str()) {
                tracing::warn!(job_id = %job_id, other_job = %other, "Ignoring update for another job");
                signals.transport_error(ClientError::Malformed(format!(
                    "update addressed to job {other}"
                )));
                return false;
            }

            let status = JobStatus::from_wire(update.into_wire());
            let terminal = status.is_terminal();
            tracing::debug!(job_id = %job_id, status = status.label(), "Push status update");
            signals.status(StatusEvent::new(job_id.clone(), status));
            terminal
        }
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                raw_message = %text,
                "Failed to parse push message",
            );
            signals.transport_error(ClientError::Malformed(e.to_string()));
            false
        }
    }
}
