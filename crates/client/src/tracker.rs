//! Job tracker: owns one job's lifecycle from submission to a single
//! terminal outcome.
//!
//! The tracker picks a transport, starts exactly one session for the
//! job and funnels that session's signals into the [`JobObserver`]. It
//! guarantees:
//!
//! - the first terminal status wins; every later signal is discarded,
//! - the phase is `Finalized` before the terminal callback runs,
//! - the session is torn down even if the callback panics,
//! - signals from a session that was replaced (push fallback) or from a
//!   previous job (after `reset`) are ignored.
//!
//! # Phases
//!
//! ```text
//! Idle --track--> Active --terminal/cancel/timeout--> Finalized --reset--> Idle
//! Idle --follow(sync | error)--> Finalized
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anclora_core::job_status::{IngestResult, JobError, JobStatus, StatusEvent};
use anclora_core::types::JobId;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::events::{SessionSignal, SignalKind, SignalRx, SignalTx};
use crate::gateway::{SubmitError, Submission};
use crate::observer::{JobFailure, JobObserver};
use crate::session::{StatusSource, TransportKind, TransportSession};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Transport to try first for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// Push channel, falling back to polling if it cannot be opened.
    #[default]
    Push,
    Poll,
}

#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    /// Give up on a job that has not finished after this long.
    /// `None` tracks indefinitely.
    pub tracking_timeout: Option<Duration>,
}

/// How a tracked job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    Succeeded(IngestResult),
    Failed(JobFailure),
    Cancelled,
}

impl Finalization {
    /// Outcome for a terminal status, `None` for `Queued`/`Processing`.
    pub fn from_terminal(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Completed(result) => Some(Finalization::Succeeded(result)),
            JobStatus::Failed(err) => Some(Finalization::Failed(JobFailure::Error(err))),
            JobStatus::Duplicate(dup) => Some(Finalization::Failed(JobFailure::Duplicate(dup))),
            JobStatus::Queued | JobStatus::Processing { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Finalization::Succeeded(_) => "succeeded",
            Finalization::Failed(_) => "failed",
            Finalization::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Active,
    Finalized(Finalization),
}

/// Misuse of the tracker lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Already tracking job {0}")]
    AlreadyActive(String),

    #[error("Tracker holds a finished job; call reset() first")]
    NeedsReset,

    #[error("Cannot reset while job {0} is being tracked")]
    ResetWhileActive(String),
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

struct TrackerState {
    phase: TrackerPhase,
    /// Bumped on every track/follow; stale dispatchers compare against it.
    generation: u64,
    job_id: Option<JobId>,
    current: Option<StatusEvent>,
    session: Option<TransportSession>,
    /// Stops the dispatch task of the current generation.
    stop: Option<CancellationToken>,
}

struct Shared {
    state: Mutex<TrackerState>,
    push: Arc<dyn StatusSource>,
    poll: Arc<dyn StatusSource>,
    observer: Arc<dyn JobObserver>,
    config: TrackerConfig,
    finalized: watch::Sender<Option<Finalization>>,
}

/// Tracks one job at a time. Cheap to clone; clones share state.
///
/// Dropping the last clone cancels an active job.
#[derive(Clone)]
pub struct JobTracker {
    handle: Arc<TrackerHandle>,
}

/// Owned by every [`JobTracker`] clone but never by the dispatcher, so
/// its drop marks the point where nobody can observe the job any more.
struct TrackerHandle {
    shared: Arc<Shared>,
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        let state = self.shared.lock();
        if state.phase != TrackerPhase::Active {
            return;
        }
        tracing::debug!(job_id = %job_label(&state), "Tracker dropped while active");
        self.shared.finalize(state, Finalization::Cancelled);
    }
}

impl JobTracker {
    pub fn new(
        push: Arc<dyn StatusSource>,
        poll: Arc<dyn StatusSource>,
        observer: Arc<dyn JobObserver>,
        config: TrackerConfig,
    ) -> Self {
        let (finalized, _) = watch::channel(None);
        let shared = Arc::new(Shared {
                state: Mutex::new(TrackerState {
                    phase: TrackerPhase::Idle,
                    generation: 0,
                    job_id: None,
                    current: None,
                    session: None,
                    stop: None,
                }),
                push,
                poll,
                observer,
                config,
                finalized,
            });
        Self {
            handle: Arc::new(TrackerHandle { shared }),
        }
    }

    /// Start following `job_id`. Must be called from within a Tokio
    /// runtime.
    pub fn track(
        &self,
        job_id: JobId,
        preference: TransportPreference,
    ) -> Result<(), TrackerError> {
        let shared = &self.handle.shared;
        let mut state = shared.lock();
        ensure_idle(&state)?;

        let source = match preference {
            TransportPreference::Push => &shared.push,
            TransportPreference::Poll => &shared.poll,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let session = source.start(job_id.clone(), tx.clone());
        let stop = CancellationToken::new();

        state.generation += 1;
        state.phase = TrackerPhase::Active;
        state.job_id = Some(job_id.clone());
        state.current = None;
        state.session = Some(session);
        state.stop = Some(stop.clone());
        let generation = state.generation;
        drop(state);

        tracing::info!(job_id = %job_id, transport = ?source.kind(), "Tracking job");

        tokio::spawn(dispatch(Arc::clone(shared), generation, rx, tx, stop));
        Ok(())
    }

    /// Continue from a submission result.
    ///
    /// Inline results finalize immediately on the calling thread without
    /// opening a session; queued jobs are tracked; submission errors
    /// finalize as failures.
    pub fn follow(
        &self,
        submission: Result<Submission, SubmitError>,
        preference: TransportPreference,
    ) -> Result<(), TrackerError> {
        let outcome = match submission {
            Ok(Submission::Async(job_id)) => return self.track(job_id, preference),
            Ok(Submission::Sync(result)) => Finalization::Succeeded(result),
            Err(e) => Finalization::Failed(JobFailure::Error(e.to_job_error())),
        };

        let mut state = self.handle.shared.lock();
        ensure_idle(&state)?;
        state.generation += 1;
        state.job_id = None;
        state.current = None;
        self.handle.shared.finalize(state, outcome);
        Ok(())
    }

    /// Stop tracking. Only an active job is affected; repeated calls
    /// are no-ops.
    pub fn cancel(&self) {
        let state = self.handle.shared.lock();
        if state.phase != TrackerPhase::Active {
            return;
        }
        self.handle.shared.finalize(state, Finalization::Cancelled);
    }

    /// Return a finished tracker to `Idle` so it can follow another job.
    pub fn reset(&self) -> Result<(), TrackerError> {
        let mut state = self.handle.shared.lock();
        if state.phase == TrackerPhase::Active {
            return Err(TrackerError::ResetWhileActive(job_label(&state)));
        }
        state.phase = TrackerPhase::Idle;
        state.job_id = None;
        state.current = None;
        self.handle.shared.finalized.send_replace(None);
        Ok(())
    }

    /// Resolve once the current job is finalized.
    pub async fn wait(&self) -> Finalization {
        let mut rx = self.handle.shared.finalized.subscribe();
        loop {
            if let Some(done) = rx.borrow_and_update().clone() {
                return done;
            }
            if rx.changed().await.is_err() {
                return Finalization::Cancelled;
            }
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.handle.shared.lock().phase.clone()
    }

    /// Most recent status received for the current job.
    pub fn current_status(&self) -> Option<StatusEvent> {
        self.handle.shared.lock().current.clone()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.handle.shared.lock().job_id.clone()
    }

    /// Transport of the live session, if any.
    pub fn transport(&self) -> Option<TransportKind> {
        self.handle.shared.lock().session.as_ref().map(TransportSession::kind)
    }
}

fn ensure_idle(state: &TrackerState) -> Result<(), TrackerError> {
    match state.phase {
        TrackerPhase::Idle => Ok(()),
        TrackerPhase::Active => Err(TrackerError::AlreadyActive(job_label(state))),
        TrackerPhase::Finalized(_) => Err(TrackerError::NeedsReset),
    }
}

fn job_label(state: &TrackerState) -> String {
    state
        .job_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Per-job loop delivering session signals in arrival order.
async fn dispatch(
    shared: Arc<Shared>,
    generation: u64,
    mut rx: SignalRx,
    tx: SignalTx,
    stop: CancellationToken,
) {
    let timeout = shared.config.tracking_timeout;
    let deadline = async move {
        match timeout {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = &mut deadline => {
                let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
                shared.on_timeout(generation, secs);
                return;
            }
            signal = rx.recv() => match signal {
                Some(signal) => shared.handle_signal(generation, signal, &tx),
                None => return,
            },
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state if `generation` is still the active job.
    fn lock_active(&self, generation: u64) -> Option<MutexGuard<'_, TrackerState>> {
        let state = self.lock();
        (state.generation == generation && state.phase == TrackerPhase::Active).then_some(state)
    }

    fn handle_signal(&self, generation: u64, signal: SessionSignal, tx: &SignalTx) {
        let Some(mut state) = self.lock_active(generation) else {
            tracing::trace!(session_id = %signal.session_id, "Discarding signal for inactive job");
            return;
        };
        let current_session = state.session.as_ref().map(TransportSession::id);
        if current_session != Some(signal.session_id) {
            tracing::trace!(session_id = %signal.session_id, "Discarding signal from replaced session");
            return;
        }

        match signal.kind {
            SignalKind::Connected => {
                drop(state);
                self.observer.on_connected();
            }
            SignalKind::TransportError(err) => {
                drop(state);
                self.observer.on_transport_error(&err);
            }
            SignalKind::Unavailable(err) => {
                let job_id = state.job_id.clone();
                let can_fall_back = state
                    .session
                    .as_ref()
                    .is_some_and(|s| s.kind() == TransportKind::Push);

                match job_id {
                    Some(job_id) if can_fall_back => {
                        tracing::warn!(
                            job_id = %job_id,
                            error = %err,
                            "Push channel unavailable, falling back to polling",
                        );
                        let poll = self.poll.start(job_id, tx.clone());
                        let replaced = state.session.replace(poll);
                        drop(state);
                        if let Some(old) = replaced {
                            old.close();
                        }
                        self.observer.on_transport_error(&err);
                    }
                    _ => {
                        let failure = JobError::reported(format!("No transport available: {err}"));
                        self.finalize(state, Finalization::Failed(JobFailure::Error(failure)));
                    }
                }
            }
            SignalKind::Status(event) => {
                state.current = Some(event.clone());
                match Finalization::from_terminal(event.status.clone()) {
                    Some(outcome) => self.finalize(state, outcome),
                    None => {
                        drop(state);
                        tracing::debug!(
                            job_id = %event.job_id,
                            status = event.status.label(),
                            "Job progress",
                        );
                        self.observer.on_progress(&event);
                    }
                }
            }
        }
    }

    fn on_timeout(&self, generation: u64, secs: u64) {
        let Some(mut state) = self.lock_active(generation) else {
            return;
        };
        let error = JobError::timeout(secs);
        if let Some(job_id) = state.job_id.clone() {
            tracing::warn!(job_id = %job_id, timeout_secs = secs, "Tracking deadline elapsed");
            state.current = Some(StatusEvent::new(job_id, JobStatus::Failed(error.clone())));
        }
        self.finalize(state, Finalization::Failed(JobFailure::Error(error)));
    }

    /// Move to `Finalized` and deliver the single terminal callback.
    ///
    /// The state lock is released before the callback runs; the session,
    /// the dispatcher and waiters are released by [`Teardown`] afterwards,
    /// also when the callback unwinds. Waiters only see the outcome if the
    /// callback did not already reset the tracker.
    fn finalize(&self, mut state: MutexGuard<'_, TrackerState>, outcome: Finalization) {
        state.phase = TrackerPhase::Finalized(outcome.clone());
        let teardown = Teardown {
            session: state.session.take(),
            stop: state.stop.take(),
            shared: self,
            generation: state.generation,
            outcome: Some(outcome.clone()),
        };
        let job_id = job_label(&state);
        drop(state);

        match &outcome {
            Finalization::Succeeded(result) => {
                tracing::info!(job_id = %job_id, source = %result.source, chunks = result.chunks, "Job succeeded");
                self.observer.on_success(result);
            }
            Finalization::Failed(failure) => {
                tracing::info!(job_id = %job_id, code = failure.code(), message = %failure.message(), "Job failed");
                self.observer.on_failure(failure);
            }
            Finalization::Cancelled => {
                tracing::info!(job_id = %job_id, "Job tracking cancelled");
                self.observer.on_cancelled();
            }
        }

        drop(teardown);
    }
}

/// Releases everything a finished job held.
struct Teardown<'a> {
    session: Option<TransportSession>,
    stop: Option<CancellationToken>,
    shared: &'a Shared,
    /// Generation of the job being finalized.
    generation: u64,
    outcome: Option<Finalization>,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(stop) = self.stop.take() {
            stop.cancel();
        }

        // Held while publishing so a concurrent reset cannot interleave.
        let state = self.shared.lock();
        let still_current = state.generation == self.generation
            && matches!(state.phase, TrackerPhase::Finalized(_));
        if still_current {
            self.shared.finalized.send_replace(self.outcome.take());
        }
    }
}

/// Session id accessor used by tests that inject signals directly.
#[cfg(test)]
impl JobTracker {
    fn session_id(&self) -> Option<uuid::Uuid> {
        self.handle.shared.lock().session.as_ref().map(TransportSession::id)
    }
}
