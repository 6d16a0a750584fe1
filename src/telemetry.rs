//! Telemetry loop shipping log events to the collector.
//!
//! Each cycle collects the pending events from its [`EventSource`], sends
//! them as one authenticated batch, and sleeps for the reporting interval.
//! Failed sends are reported and the events are dropped; there is no retry
//! or buffering across cycles.
//!
//! Unlike the heartbeat loop, the interval sleep here is not sliced for
//! cancellation polling: the signal is only checked at the top of each
//! cycle, so shutdown may lag by up to one interval.

use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventSource, LogEvent};

/// Interval between telemetry cycles.
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Per-request timeout for an ingestion batch.
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(15);

/// Periodic log event shipper.
///
/// State machine: `Running → (cancelled) → Stopped`.
pub struct TelemetryLoop {
    /// The underlying HTTP client
    client: Client,

    /// URL of the log ingestion endpoint
    ingest_url: String,

    /// Credential presented as a bearer token
    api_key: String,

    /// Producer of this cycle's events
    source: Box<dyn EventSource>,

    /// Interval between cycles
    interval: Duration,

    /// Per-request timeout
    timeout: Duration,
}

impl TelemetryLoop {
    /// Create a telemetry loop with the production interval and timeout.
    pub fn new(
        client: Client,
        ingest_url: impl Into<String>,
        api_key: impl Into<String>,
        source: Box<dyn EventSource>,
    ) -> Self {
        Self {
            client,
            ingest_url: ingest_url.into(),
            api_key: api_key.into(),
            source,
            interval: TELEMETRY_INTERVAL,
            timeout: TELEMETRY_TIMEOUT,
        }
    }

    /// Create a telemetry loop with custom timing settings.
    ///
    /// This is useful for testing cycle behavior without waiting out the
    /// production interval.
    pub fn with_settings(
        client: Client,
        ingest_url: impl Into<String>,
        api_key: impl Into<String>,
        source: Box<dyn EventSource>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            ingest_url: ingest_url.into(),
            api_key: api_key.into(),
            source,
            interval,
            timeout,
        }
    }

    /// Run the loop until the cancellation signal is set.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(url = %self.ingest_url, "Telemetry loop started");

        while !cancel.is_cancelled() {
            let events = self.source.collect();

            if events.is_empty() {
                debug!("No events this cycle, skipping ingestion request");
            } else if let Err(e) = self.send_events(&events).await {
                // Events are dropped; the next cycle ships fresh ones
                warn!(error = %e, count = events.len(), "Failed to send log events");
            } else {
                debug!(count = events.len(), "Log events sent");
            }

            tokio::time::sleep(self.interval).await;
        }

        info!("Telemetry loop stopped");
    }

    /// Send one batch of events. Any response counts as delivered.
    async fn send_events(&self, events: &[LogEvent]) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.ingest_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&events)
            .send()
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn http_client() -> Client {
        Client::new()
    }

    /// URL of a port nothing is listening on.
    fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/api/ingestion/logs", addr)
    }

    /// Event source that counts how many cycles asked it for events.
    struct CountingSource {
        cycles: Arc<AtomicUsize>,
        events: Vec<LogEvent>,
    }

    impl CountingSource {
        fn new(events: Vec<LogEvent>) -> (Self, Arc<AtomicUsize>) {
            let cycles = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    cycles: cycles.clone(),
                    events,
                },
                cycles,
            )
        }
    }

    impl EventSource for CountingSource {
        fn collect(&mut self) -> Vec<LogEvent> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            self.events.clone()
        }
    }

    #[tokio::test]
    async fn test_send_failure_does_not_prevent_next_cycle() {
        let (source, cycles) =
            CountingSource::new(vec![LogEvent::new("host", "svc", "message")]);

        let tl = TelemetryLoop::with_settings(
            http_client(),
            unreachable_url(),
            "key",
            Box::new(source),
            Duration::from_millis(20),
            Duration::from_millis(200),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tl.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("telemetry loop did not stop after cancellation")
            .unwrap();

        // The first failed send must not have stopped the loop
        assert!(cycles.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_events_sent_as_json_array_with_bearer_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ingestion/logs")
            .match_header("authorization", "Bearer key")
            .match_body(Matcher::Json(serde_json::json!([
                {
                    "hostname": "host",
                    "data": {"service": "svc", "message": "message"}
                }
            ])))
            .with_status(200)
            .expect_at_least(1)
            .create_async()
            .await;

        let (source, _) = CountingSource::new(vec![LogEvent::new("host", "svc", "message")]);

        let tl = TelemetryLoop::with_settings(
            http_client(),
            format!("{}/api/ingestion/logs", server.url()),
            "key",
            Box::new(source),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tl.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("telemetry loop did not stop after cancellation")
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ingestion/logs")
            .expect(0)
            .create_async()
            .await;

        let (source, cycles) = CountingSource::new(Vec::new());

        let tl = TelemetryLoop::with_settings(
            http_client(),
            format!("{}/api/ingestion/logs", server.url()),
            "key",
            Box::new(source),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tl.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("telemetry loop did not stop after cancellation")
            .unwrap();

        assert!(cycles.load(Ordering::SeqCst) >= 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancellation_observed_at_cycle_boundary() {
        let (source, _) = CountingSource::new(Vec::new());

        let tl = TelemetryLoop::with_settings(
            http_client(),
            unreachable_url(),
            "key",
            Box::new(source),
            Duration::from_millis(50),
            Duration::from_millis(200),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tl.run(cancel.clone()));

        cancel.cancel();

        // Latency is bounded by one full interval, not the poll granularity
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("telemetry loop did not stop after cancellation")
            .unwrap();
    }
}
