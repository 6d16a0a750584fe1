//! Configuration module for the endpoint agent.
//!
//! This module provides environment-based configuration for the agent,
//! including the collector URL and the location of the persisted credential.

use std::env;
use std::path::PathBuf;

/// Default base URL for the collector
const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Default path for the persisted credential file
const DEFAULT_CREDENTIAL_PATH: &str = "agent_config.json";

/// Path of the registration endpoint on the collector
const REGISTER_PATH: &str = "/api/agents/register";

/// Path of the heartbeat endpoint on the collector
const HEARTBEAT_PATH: &str = "/api/agents/heartbeat";

/// Path of the log ingestion endpoint on the collector
const INGEST_PATH: &str = "/api/ingestion/logs";

/// Configuration for the endpoint agent.
///
/// All settings can be configured via environment variables:
/// - `ENDPOINT_AGENT_SERVER_URL`: Collector base URL (default: http://localhost:3000)
/// - `ENDPOINT_AGENT_CREDENTIAL_PATH`: Credential file path (default: agent_config.json)
///
/// Reporting intervals and request timeouts are fixed; they are part of the
/// collector contract, not operator-tunable settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the collector
    pub server_url: String,

    /// Full URL for the registration endpoint
    pub register_url: String,

    /// Full URL for the heartbeat endpoint
    pub heartbeat_url: String,

    /// Full URL for the log ingestion endpoint
    pub ingest_url: String,

    /// Location of the persisted credential file
    pub credential_path: PathBuf,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Returns a new `Config` instance with values from environment variables,
    /// falling back to defaults where appropriate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `ENDPOINT_AGENT_SERVER_URL` is set to an empty string
    /// - `ENDPOINT_AGENT_CREDENTIAL_PATH` is set to an empty string
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = env::var("ENDPOINT_AGENT_SERVER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        // Normalize: endpoint paths are appended below
        let server_url = server_url.trim_end_matches('/').to_string();

        if server_url.is_empty() {
            return Err(ConfigError {
                message: "server URL must not be empty".to_string(),
                env_var: Some("ENDPOINT_AGENT_SERVER_URL".to_string()),
            });
        }

        let credential_path = env::var("ENDPOINT_AGENT_CREDENTIAL_PATH")
            .unwrap_or_else(|_| DEFAULT_CREDENTIAL_PATH.to_string());

        if credential_path.is_empty() {
            return Err(ConfigError {
                message: "credential path must not be empty".to_string(),
                env_var: Some("ENDPOINT_AGENT_CREDENTIAL_PATH".to_string()),
            });
        }

        Ok(Self::with_server_url(server_url, PathBuf::from(credential_path)))
    }

    /// Build a configuration from an explicit collector URL and credential path.
    ///
    /// The endpoint URLs are derived from the base URL. This is the
    /// constructor used by tests to point the agent at a mock collector.
    pub fn with_server_url(server_url: impl Into<String>, credential_path: PathBuf) -> Self {
        let server_url = server_url.into();
        let server_url = server_url.trim_end_matches('/').to_string();

        Self {
            register_url: format!("{}{}", server_url, REGISTER_PATH),
            heartbeat_url: format!("{}{}", server_url, HEARTBEAT_PATH),
            ingest_url: format!("{}{}", server_url, INGEST_PATH),
            server_url,
            credential_path,
        }
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self::with_server_url(DEFAULT_SERVER_URL, PathBuf::from(DEFAULT_CREDENTIAL_PATH))
    }
}
