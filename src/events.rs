//! Log event model and event production.
//!
//! A [`LogEvent`] is one observation shipped to the collector's ingestion
//! endpoint. Events are created fresh each telemetry cycle and are never
//! persisted or retried.
//!
//! Event production sits behind the [`EventSource`] trait so the actual
//! log-collection mechanism stays pluggable; the built-in
//! [`HostStatusSource`] emits a single liveness event per cycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Service name reported by the built-in event source.
const AGENT_SERVICE: &str = "endpoint-agent";

/// Hostname reported when the host name cannot be determined.
const FALLBACK_HOSTNAME: &str = "local-machine";

/// Payload of a log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogData {
    /// Name of the service the observation belongs to
    pub service: String,

    /// Human-readable message
    pub message: String,
}

/// A single structured observation shipped to the collector.
///
/// The serialized shape, `{"hostname": ..., "data": {"service": ...,
/// "message": ...}}`, is part of the ingestion contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Host the observation originated from
    pub hostname: String,

    /// Structured payload
    pub data: LogData,
}

impl LogEvent {
    /// Create a new log event.
    pub fn new(
        hostname: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            data: LogData {
                service: service.into(),
                message: message.into(),
            },
        }
    }
}

/// Producer of log events for the telemetry loop.
///
/// Implementations may return zero or more events per cycle. Returning an
/// empty batch skips that cycle's ingestion request.
pub trait EventSource: Send {
    /// Collect the events for one telemetry cycle.
    fn collect(&mut self) -> Vec<LogEvent>;
}

/// Built-in event source reporting agent liveness.
///
/// Produces exactly one event per cycle carrying the host name and a
/// timestamped status message.
pub struct HostStatusSource {
    hostname: String,
}

impl HostStatusSource {
    /// Create a source using the host's name, falling back to a fixed
    /// placeholder when it cannot be determined.
    pub fn new() -> Self {
        Self {
            hostname: System::host_name().unwrap_or_else(|| FALLBACK_HOSTNAME.to_string()),
        }
    }
}

impl Default for HostStatusSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for HostStatusSource {
    fn collect(&mut self) -> Vec<LogEvent> {
        vec![LogEvent::new(
            self.hostname.clone(),
            AGENT_SERVICE,
            format!("Agent is alive and running at {}", Utc::now().to_rfc3339()),
        )]
    }
}
