//! Transport sessions and the [`StatusSource`] seam.
//!
//! A [`TransportSession`] is the runtime half of one push connection
//! loop or one polling loop: a spawned task plus the
//! [`CancellationToken`] that owns every timer inside it. Closing the
//! session cancels the token; the task observes it at its next
//! suspension point and exits without emitting anything further.

use std::future::Future;

use anclora_core::types::JobId;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{SignalSender, SignalTx};

/// Which transport backs a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Push,
    Poll,
}

/// A way of learning about a job's status.
///
/// Implemented by the push channel and poll clients. The tracker picks
/// one per job and never looks past this interface.
pub trait StatusSource: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Start a fresh session for `job_id` reporting into `signals`.
    ///
    /// Must be called from within a Tokio runtime.
    fn start(&self, job_id: JobId, signals: SignalTx) -> TransportSession;
}

/// One connection loop or polling loop for one job.
///
/// Never reused across jobs. Dropping a session closes it.
#[derive(Debug)]
pub struct TransportSession {
    id: Uuid,
    kind: TransportKind,
    job_id: JobId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TransportSession {
    /// Spawn `run` as the session task.
    ///
    /// `run` receives a sender stamped with the new session id and the
    /// session's cancellation token.
    pub fn spawn<F, Fut>(kind: TransportKind, job_id: JobId, tx: SignalTx, run: F) -> Self
    where
        F: FnOnce(SignalSender, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let signals = SignalSender::new(id, tx);
        let task = tokio::spawn(run(signals, cancel.clone()));

        tracing::debug!(job_id = %job_id, session_id = %id, transport = ?kind, "Session started");

        Self {
            id,
            kind,
            job_id,
            cancel,
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Whether the session was closed or stopped itself.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the session's timers and connection. Idempotent.
    pub fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        tracing::debug!(
            job_id = %self.job_id,
            session_id = %self.id,
            transport = ?self.kind,
            "Session closed",
        );
    }

    /// Wait for the session task to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(session_id = %self.id, error = %e, "Session task ended abnormally");
            }
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
