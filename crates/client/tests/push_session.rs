//! Push channel behaviour against an in-memory server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anclora_client::client::ClientError;
use anclora_client::events::{SessionSignal, SignalKind};
use anclora_client::observer::JobFailure;
use anclora_client::push::{PushChannelClient, PushSettings};
use anclora_client::session::{StatusSource, TransportKind};
use anclora_client::tracker::{Finalization, JobTracker, TrackerConfig, TransportPreference};
use assert_matches::assert_matches;
use common::*;
use serde_json::json;
use tokio::sync::mpsc;

fn drain(rx: &mut mpsc::UnboundedReceiver<SessionSignal>) -> Vec<SignalKind> {
    std::iter::from_fn(|| rx.try_recv().ok()).map(|s| s.kind).collect()
}

#[tokio::test(start_paused = true)]
async fn unexpected_close_reconnects_once_after_backoff() {
    let (connector, mut servers) = FakeConnector::new(vec![]);
    let client = PushChannelClient::new(connector.clone(), PushSettings::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let session = client.start(job(), tx);
    let mut first = servers.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    first.close();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(connector.attempts(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(connector.attempts(), 2);
    let _second = servers.recv().await.unwrap();

    // The new connection stays up; no further attempts.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 2);

    let connected = drain(&mut rx)
        .into_iter()
        .filter(|k| matches!(k, SignalKind::Connected))
        .count();
    assert_eq!(connected, 2);
    session.close();
}

#[tokio::test(start_paused = true)]
async fn close_before_backoff_suppresses_reconnect() {
    let (connector, mut servers) = FakeConnector::new(vec![]);
    let client = PushChannelClient::new(connector.clone(), PushSettings::default());
    let (tx, _rx) = mpsc::unbounded_channel();

    let session = client.start(job(), tx);
    let mut server = servers.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.close();
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.close();
    session.close();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_reconnects_keep_retrying_on_the_fixed_delay() {
    let (connector, mut servers) = FakeConnector::new(vec![
        Outcome::Accept,
        Outcome::Refuse,
        Outcome::Refuse,
    ]);
    let client = PushChannelClient::new(connector.clone(), PushSettings::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let session = client.start(job(), tx);
    let mut server = servers.recv().await.unwrap();
    server.close();

    // Drop at ~0s, attempts at 3s, 6s (refused) and 9s (accepted).
    tokio::time::sleep(Duration::from_millis(9500)).await;
    assert_eq!(connector.attempts(), 4);

    let kinds = drain(&mut rx);
    let errors = kinds
        .iter()
        .filter(|k| matches!(k, SignalKind::TransportError(ClientError::Connection(_))))
        .count();
    assert_eq!(errors, 2);
    assert!(!kinds.iter().any(|k| matches!(k, SignalKind::Unavailable(_))));
    session.close();
}

#[tokio::test(start_paused = true)]
async fn heartbeat_pings_while_connected() {
    let (connector, mut servers) = FakeConnector::new(vec![]);
    let client = PushChannelClient::new(connector, PushSettings::default());
    let (tx, _rx) = mpsc::unbounded_channel();

    let session = client.start(job(), tx);
    let mut server = servers.recv().await.unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(server.received().is_empty());

    tokio::time::sleep(Duration::from_secs(62)).await;
    assert_eq!(server.received(), vec!["ping", "ping", "ping"]);

    session.close();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(server.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_open_failure_reports_unavailable_and_stops() {
    let (connector, _servers) = FakeConnector::new(vec![Outcome::Refuse]);
    let client = PushChannelClient::new(connector.clone(), PushSettings::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let session = client.start(job(), tx);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(session.is_closed());
    assert_eq!(connector.attempts(), 1);
    let kinds = drain(&mut rx);
    assert_eq!(kinds.len(), 1);
    assert!(matches!(kinds[0], SignalKind::Unavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_end_the_job() {
    let (connector, mut servers) = FakeConnector::new(vec![]);
    let push = Arc::new(PushChannelClient::new(connector, PushSettings::default()));
    let poll = ManualSource::new(TransportKind::Poll);
    let recorder = Recorder::new();
    let tracker = JobTracker::new(push, poll, recorder.clone(), TrackerConfig::default());

    tracker.track(job(), TransportPreference::Push).unwrap();
    let server = servers.recv().await.unwrap();
    server.send_raw("{not json");
    server.send(json!({"type": "mystery"}));
    server.send(json!({"type": "job_update", "job_id": "abc", "status": "duplicate", "message": "Already indexed"}));

    assert_matches!(
        tracker.wait().await,
        Finalization::Failed(JobFailure::Duplicate(dup)) if dup.message.as_deref() == Some("Already indexed")
    );
    let errors = recorder
        .seen()
        .iter()
        .filter(|s| matches!(s, Seen::TransportError))
        .count();
    assert_eq!(errors, 2);
}

#[tokio::test(start_paused = true)]
async fn terminal_push_update_closes_the_channel() {
    let (connector, mut servers) = FakeConnector::new(vec![]);
    let client = PushChannelClient::new(connector.clone(), PushSettings::default());
    let (tx, _rx) = mpsc::unbounded_channel();

    let session = client.start(job(), tx);
    let server = servers.recv().await.unwrap();
    server.send(json!({"type": "job_update", "status": "failed", "error": "Parser crashed"}));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(session.is_closed());
    assert_eq!(connector.attempts(), 1);
}
