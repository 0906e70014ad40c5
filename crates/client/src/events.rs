//! Signals emitted by transport sessions.
//!
//! Both transports report through the same channel so the tracker can
//! process everything for one job in arrival order. Every signal is
//! stamped with the id of the session that produced it; the tracker
//! drops signals from sessions it has already replaced.

use anclora_core::job_status::StatusEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::ClientError;

/// What a session observed.
#[derive(Debug, Clone)]
pub enum SignalKind {
    /// The push channel opened. Not a status event.
    Connected,

    /// A normalized status notification.
    Status(StatusEvent),

    /// A recoverable transport failure. The session keeps going.
    TransportError(ClientError),

    /// The transport could not be started at all and the session has
    /// ended. The tracker may fall back to another transport.
    Unavailable(ClientError),
}

/// A [`SignalKind`] tagged with its originating session.
#[derive(Debug, Clone)]
pub struct SessionSignal {
    pub session_id: Uuid,
    pub kind: SignalKind,
}

/// Receiving half handed to the tracker.
pub type SignalRx = mpsc::UnboundedReceiver<SessionSignal>;

/// Sending half handed to a transport when it starts.
pub type SignalTx = mpsc::UnboundedSender<SessionSignal>;

/// Session-scoped sender that stamps every signal with the session id.
#[derive(Debug, Clone)]
pub struct SignalSender {
    session_id: Uuid,
    tx: SignalTx,
}

impl SignalSender {
    pub fn new(session_id: Uuid, tx: SignalTx) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn connected(&self) {
        self.send(SignalKind::Connected);
    }

    pub fn status(&self, event: StatusEvent) {
        self.send(SignalKind::Status(event));
    }

    pub fn transport_error(&self, error: ClientError) {
        self.send(SignalKind::TransportError(error));
    }

    pub fn unavailable(&self, error: ClientError) {
        self.send(SignalKind::Unavailable(error));
    }

    fn send(&self, kind: SignalKind) {
        // A closed receiver only means the tracker is gone.
        let _ = self.tx.send(SessionSignal {
            session_id: self.session_id,
            kind,
        });
    }
}
