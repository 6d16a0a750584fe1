//! Heartbeat loop keeping the agent marked online at the collector.
//!
//! Each cycle sends one authenticated, empty-bodied POST and then sleeps
//! for the reporting interval. A failed heartbeat is never fatal: the
//! collector tolerates gaps, so transport errors are logged and the loop
//! proceeds to the next cycle.
//!
//! The sleep is broken into short slices so the cancellation signal is
//! observed within one second rather than after the full interval.

use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Interval between heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Per-request timeout for a heartbeat.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the cancellation signal is polled during the interval sleep.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic liveness reporter.
///
/// State machine: `Running → (cancelled) → Stopped`. Once cancellation is
/// observed no further requests are started.
pub struct HeartbeatLoop {
    /// The underlying HTTP client
    client: Client,

    /// URL of the heartbeat endpoint
    heartbeat_url: String,

    /// Credential presented as a bearer token
    api_key: String,

    /// Interval between heartbeats
    interval: Duration,

    /// Granularity of cancellation polling during the interval sleep
    poll_interval: Duration,

    /// Per-request timeout
    timeout: Duration,
}

impl HeartbeatLoop {
    /// Create a heartbeat loop with the production interval and timeout.
    pub fn new(client: Client, heartbeat_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            heartbeat_url: heartbeat_url.into(),
            api_key: api_key.into(),
            interval: HEARTBEAT_INTERVAL,
            poll_interval: CANCEL_POLL_INTERVAL,
            timeout: HEARTBEAT_TIMEOUT,
        }
    }

    /// Create a heartbeat loop with custom timing settings.
    ///
    /// This is useful for testing cancellation behavior without waiting out
    /// the production interval.
    pub fn with_settings(
        client: Client,
        heartbeat_url: impl Into<String>,
        api_key: impl Into<String>,
        interval: Duration,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            heartbeat_url: heartbeat_url.into(),
            api_key: api_key.into(),
            interval,
            poll_interval,
            timeout,
        }
    }

    /// Run the loop until the cancellation signal is set.
    pub async fn run(self, cancel: CancellationToken) {
        info!(url = %self.heartbeat_url, "Heartbeat loop started");

        while !cancel.is_cancelled() {
            if let Err(e) = self.send_heartbeat().await {
                // Non-fatal; the next cycle tries again
                debug!(error = %e, "Heartbeat failed, will retry next cycle");
            }

            self.idle(&cancel).await;
        }

        info!("Heartbeat loop stopped");
    }

    /// Send a single heartbeat. Any response counts as delivered.
    async fn send_heartbeat(&self) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.heartbeat_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        debug!("Heartbeat sent");
        Ok(())
    }

    /// Sleep for the reporting interval, polling the cancellation signal.
    ///
    /// Returns as soon as cancellation is observed, so shutdown latency is
    /// bounded by the poll granularity rather than the full interval.
    async fn idle(&self, cancel: &CancellationToken) {
        let mut slept = Duration::ZERO;

        while slept < self.interval {
            if cancel.is_cancelled() {
                return;
            }

            let step = self.poll_interval.min(self.interval - slept);
            tokio::time::sleep(step).await;
            slept += step;
        }
    }
}
