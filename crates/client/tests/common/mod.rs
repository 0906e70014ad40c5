//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anclora_client::api::SubmitResponse;
use anclora_client::client::{ClientError, PushConnection, PushConnector};
use anclora_client::events::{SignalSender, SignalTx};
use anclora_client::gateway::Submitter;
use anclora_client::observer::{JobFailure, JobObserver};
use anclora_client::poll::StatusFetcher;
use anclora_client::session::{StatusSource, TransportKind, TransportSession};
use anclora_core::job_status::{IngestResult, JobStatus, StatusEvent, WireStatus};
use anclora_core::types::JobId;
use anclora_core::upload::UploadRequest;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn job() -> JobId {
    JobId::new("abc").unwrap()
}

pub fn pdf_upload() -> UploadRequest {
    UploadRequest::new("x.pdf", None, b"%PDF-1.4 test".to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

/// What the next connection attempt does.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Accept,
    Refuse,
}

/// Server side of one accepted fake connection.
pub struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<Result<String, ClientError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn send(&self, frame: serde_json::Value) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(frame.to_string()));
        }
    }

    pub fn send_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    /// Drop the connection as if the server went away.
    pub fn close(&mut self) {
        self.to_client.take();
    }

    /// Frames the client has sent so far.
    pub fn received(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Connector handing the server end of every accepted connection to
/// the test.
pub struct FakeConnector {
    script: Mutex<VecDeque<Outcome>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
    attempts: AtomicU32,
}

impl FakeConnector {
    /// Attempts beyond the script are accepted.
    pub fn new(script: Vec<Outcome>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into()),
            servers,
            attempts: AtomicU32::new(0),
        });
        (connector, rx)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushConnector for FakeConnector {
    async fn connect(&self, _job_id: &JobId) -> Result<PushConnection, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Accept);

        if let Outcome::Refuse = outcome {
            return Err(ClientError::Connection("connection refused".into()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();

        let sink = futures::sink::unfold(client_tx, |tx, frame: String| async move {
            tx.send(frame)
                .map_err(|_| ClientError::Connection("peer gone".into()))?;
            Ok::<_, ClientError>(tx)
        });
        let stream = futures::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let _ = self.servers.send(ServerEnd {
            to_client: Some(to_client),
            from_client,
        });
        Ok(PushConnection::new(sink, stream))
    }
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

/// Replays scripted answers, repeating the last one forever.
pub struct ScriptedFetcher {
    answers: Mutex<VecDeque<Result<WireStatus, ClientError>>>,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    pub fn new(answers: Vec<Result<WireStatus, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusFetcher for ScriptedFetcher {
    async fn fetch_status(&self, _job_id: &JobId) -> Result<WireStatus, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers.front().cloned().unwrap()
        }
    }
}

pub fn wire(status: &str) -> Result<WireStatus, ClientError> {
    Ok(WireStatus::new(status))
}

// ---------------------------------------------------------------------------
// Manually driven source
// ---------------------------------------------------------------------------

/// Source whose sessions emit only what the test injects.
pub struct ManualSource {
    kind: TransportKind,
    sessions: Arc<Mutex<Vec<(SignalSender, CancellationToken)>>>,
}

impl ManualSource {
    pub fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            sessions: Arc::default(),
        })
    }

    pub fn started(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Sender of the `n`th session started from this source.
    pub fn sender(&self, n: usize) -> SignalSender {
        self.sessions.lock().unwrap()[n].0.clone()
    }

    pub fn is_closed(&self, n: usize) -> bool {
        self.sessions.lock().unwrap()[n].1.is_cancelled()
    }
}

impl StatusSource for ManualSource {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn start(&self, job_id: JobId, tx: SignalTx) -> TransportSession {
        let sessions = Arc::clone(&self.sessions);
        TransportSession::spawn(self.kind, job_id, tx, move |signals, cancel| {
            sessions.lock().unwrap().push((signals, cancel.clone()));
            async move { cancel.cancelled().await }
        })
    }
}

pub fn status(status: JobStatus) -> StatusEvent {
    StatusEvent::new(job(), status)
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

pub struct FixedSubmitter(pub SubmitResponse);

#[async_trait]
impl Submitter for FixedSubmitter {
    async fn submit(&self, _upload: &UploadRequest) -> Result<SubmitResponse, ClientError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Connected,
    Progress(JobStatus),
    TransportError,
    Success(IngestResult),
    Failure(JobFailure),
    Cancelled,
}

impl Seen {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Seen::Success(_) | Seen::Failure(_) | Seen::Cancelled)
    }
}

/// Records every callback in order.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
    panic_on_terminal: AtomicBool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A recorder whose terminal callbacks panic after recording.
    pub fn panicking() -> Arc<Self> {
        let recorder = Self::default();
        recorder.panic_on_terminal.store(true, Ordering::SeqCst);
        Arc::new(recorder)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn terminal(&self) -> Vec<Seen> {
        self.seen().into_iter().filter(Seen::is_terminal).collect()
    }

    fn push(&self, seen: Seen) {
        let terminal = seen.is_terminal();
        self.seen.lock().unwrap().push(seen);
        if terminal && self.panic_on_terminal.load(Ordering::SeqCst) {
            panic!("observer blew up");
        }
    }
}

impl JobObserver for Recorder {
    fn on_connected(&self) {
        self.push(Seen::Connected);
    }

    fn on_progress(&self, event: &StatusEvent) {
        self.push(Seen::Progress(event.status.clone()));
    }

    fn on_transport_error(&self, _error: &ClientError) {
        self.push(Seen::TransportError);
    }

    fn on_cancelled(&self) {
        self.push(Seen::Cancelled);
    }

    fn on_success(&self, result: &IngestResult) {
        self.push(Seen::Success(result.clone()));
    }

    fn on_failure(&self, failure: &JobFailure) {
        self.push(Seen::Failure(failure.clone()));
    }
}
