//! Backoff and reconnection logic for the push channel.
//!
//! When an established push connection drops, the session calls
//! [`reconnect_loop`] to wait out the backoff and reopen the channel
//! for the same job, repeating until a connection succeeds or the
//! session's [`CancellationToken`] is triggered.
//!
//! The default policy is a fixed delay. Raising
//! [`ReconnectConfig::multiplier`] above `1.0` turns it into capped
//! exponential backoff.

use std::time::Duration;

use anclora_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, PushConnection, PushConnector};
use crate::events::SignalSender;

/// Default delay before reopening a dropped push channel.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Same delay before every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Open the push channel once, bounded by `timeout`.
///
/// Returns `None` if `cancel` fires before the handshake resolves.
pub async fn open_once(
    connector: &dyn PushConnector,
    job_id: &JobId,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<Result<PushConnection, ClientError>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, connector.connect(job_id)) => {
            Some(result.unwrap_or(Err(ClientError::Timeout(timeout))))
        }
    }
}

/// Reopen a dropped push channel, waiting the backoff before each
/// attempt.
///
/// Failed attempts are reported through `signals` as transport errors.
/// Returns `Some(connection)` once an attempt succeeds, or `None` if
/// the `cancel` token is triggered first.
pub async fn reconnect_loop(
    connector: &dyn PushConnector,
    job_id: &JobId,
    config: &ReconnectConfig,
    connect_timeout: Duration,
    signals: &SignalSender,
    cancel: &CancellationToken,
) -> Option<PushConnection> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job_id, "Reconnect cancelled");
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        tracing::info!(
            job_id = %job_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting push channel",
        );

        match open_once(connector, job_id, connect_timeout, cancel).await? {
            Ok(conn) => {
                tracing::info!(job_id = %job_id, attempt, "Push channel reconnected");
                return Some(conn);
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Reconnect attempt {attempt} failed",
                );
                signals.transport_error(e);
            }
        }

        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;

    fn exponential() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Refuses every connection and counts attempts.
    struct Refusing(AtomicU32);

    #[async_trait]
    impl PushConnector for Refusing {
        async fn connect(&self, _job_id: &JobId) -> Result<PushConnection, ClientError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Connection("refused".into()))
        }
    }

    #[test]
    fn default_delay_is_fixed() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, DEFAULT_RECONNECT_DELAY);
        let d = next_delay(config.initial_delay, &config);
        assert_eq!(d, DEFAULT_RECONNECT_DELAY);
    }

    #[test]
    fn next_delay_doubles() {
        let d = next_delay(Duration::from_secs(1), &exponential());
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            ..exponential()
        };
        let d = next_delay(Duration::from_secs(8), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = exponential();
        let mut delay = config.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }

    #[tokio::test]
    async fn cancellation_token_stops_reconnect() {
        let cancel = CancellationToken::new();
        // Cancel immediately -- reconnect_loop should return None without trying to connect
        cancel.cancel();

        let connector = Refusing(AtomicU32::new(0));
        let (tx, _rx) = mpsc::unbounded_channel();
        let signals = SignalSender::new(Uuid::new_v4(), tx);
        let job = JobId::new("abc").unwrap();

        let result = reconnect_loop(
            &connector,
            &job,
            &ReconnectConfig::default(),
            Duration::from_secs(10),
            &signals,
            &cancel,
        )
        .await;

        assert!(result.is_none());
        assert_eq!(connector.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_reported_and_retried() {
        let cancel = CancellationToken::new();
        let connector = Refusing(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signals = SignalSender::new(Uuid::new_v4(), tx);
        let job = JobId::new("abc").unwrap();

        let stop = cancel.clone();
        tokio::spawn(async move {
            // Three fixed 3s waits fit before the 10s mark.
            tokio::time::sleep(Duration::from_secs(10)).await;
            stop.cancel();
        });

        let result = reconnect_loop(
            &connector,
            &job,
            &ReconnectConfig::default(),
            Duration::from_secs(1),
            &signals,
            &cancel,
        )
        .await;

        assert!(result.is_none());
        assert_eq!(connector.0.load(Ordering::SeqCst), 3);
        let mut reported = 0;
        while rx.try_recv().is_ok() {
            reported += 1;
        }
        assert_eq!(reported, 3);
    }
}
