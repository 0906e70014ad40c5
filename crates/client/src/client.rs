//! WebSocket connector for the job push channel.
//!
//! [`PushConnector`] is the seam the push session opens connections
//! through. [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`; tests substitute in-memory connectors built on
//! [`PushConnection::new`].

use std::pin::Pin;
use std::time::Duration;

use anclora_core::job_events::PUSH_CHANNEL_PATH;
use anclora_core::types::JobId;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Outbound half of a push connection: accepts text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ClientError> + Send>>;

/// Inbound half of a push connection: yields text frames until the
/// peer closes.
pub type FrameStream = BoxStream<'static, Result<String, ClientError>>;

/// A live push channel, already split into its two halves.
pub struct PushConnection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl PushConnection {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = ClientError> + Send + 'static,
        St: Stream<Item = Result<String, ClientError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        }
    }
}

/// Opens push channels for a job.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, job_id: &JobId) -> Result<PushConnection, ClientError>;
}

/// Build the push channel URL for a job (`{ws_url}/ws/jobs/{job_id}`).
pub fn push_channel_url(ws_url: &str, job_id: &JobId) -> String {
    format!(
        "{}{}/{}",
        ws_url.trim_end_matches('/'),
        PUSH_CHANNEL_PATH,
        job_id
    )
}

/// Connects to the ingestion server's WebSocket endpoint.
pub struct WsConnector {
    ws_url: String,
}

impl WsConnector {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8030`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL (e.g. `ws://host:8030`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, job_id: &JobId) -> Result<PushConnection, ClientError> {
        let url = push_channel_url(&self.ws_url, job_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to {url}: {e}"))
        })?;

        tracing::info!(job_id = %job_id, "Connected to push channel at {}", self.ws_url);

        let (sink, stream) = ws_stream.split();

        let sink = sink
            .sink_map_err(|e| ClientError::Protocol(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, ClientError>(Message::Text(text))));

        let job = job_id.clone();
        let stream = stream
            .take_while(move |msg| {
                let open = !matches!(msg, Ok(Message::Close(_)));
                if !open {
                    tracing::info!(job_id = %job, "Server closed push channel");
                }
                future::ready(open)
            })
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(_)) => {
                        tracing::trace!("Ignoring binary frame on push channel");
                        None
                    }
                    // Ping/Pong are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(Err(ClientError::Protocol(e.to_string()))),
                })
            });

        Ok(PushConnection::new(sink, stream))
    }
}

/// Transport-level failures. None of them end a tracked job on their
/// own except [`ClientError::NotFound`], which the poll session turns
/// into a terminal event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection handshake did not finish in time.
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// A frame could not be interpreted.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The server no longer knows the job.
    #[error("Job {0} not found or expired")]
    NotFound(String),

    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The server answered with a non-2xx status.
    #[error("Server error ({status}): {body}")]
    Api { status: u16, body: String },
}
