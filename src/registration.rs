//! Registration client for the one-time enrollment handshake.
//!
//! Registration exchanges a short-lived, single-use token for the
//! long-lived API key the agent uses from then on. The exchange is a
//! single request with no retry: on any failure the token must be assumed
//! consumed on the collector side and the operator re-registers with a
//! fresh one.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credentials::{CredentialStore, CredentialStoreError};
use crate::identity;

/// Timeout for the registration request.
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of the registration request.
#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    registration_token: &'a str,
    device_identifier: &'a str,
}

/// Body of the registration response.
#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    api_key: Option<String>,
}

/// Errors that can occur during registration.
#[derive(Debug)]
pub enum RegistrationError {
    /// The collector refused the token
    Rejected {
        status: StatusCode,
        body: String,
    },

    /// The request could not be completed
    Network(reqwest::Error),

    /// The collector answered 2xx but issued no usable API key
    Malformed(String),

    /// The issued credential could not be persisted
    Store(CredentialStoreError),

    /// The HTTP client could not be built
    Client(String),
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::Rejected { status, body } => {
                write!(f, "Registration rejected ({}): {}", status, body)
            }
            RegistrationError::Network(e) => write!(f, "Registration request failed: {}", e),
            RegistrationError::Malformed(reason) => {
                write!(f, "Malformed registration response: {}", reason)
            }
            RegistrationError::Store(e) => write!(f, "Failed to persist credential: {}", e),
            RegistrationError::Client(e) => write!(f, "HTTP client error: {}", e),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Network(e) => Some(e),
            RegistrationError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RegistrationError {
    fn from(err: reqwest::Error) -> Self {
        RegistrationError::Network(err)
    }
}

impl From<CredentialStoreError> for RegistrationError {
    fn from(err: CredentialStoreError) -> Self {
        RegistrationError::Store(err)
    }
}

/// Client for the collector's registration endpoint.
pub struct RegistrationClient {
    /// The underlying HTTP client
    client: Client,

    /// URL of the registration endpoint
    register_url: String,

    /// Request timeout duration
    timeout: Duration,
}

impl RegistrationClient {
    /// Create a registration client sharing an existing HTTP client.
    pub fn new(client: Client, register_url: impl Into<String>) -> Self {
        Self {
            client,
            register_url: register_url.into(),
            timeout: REGISTRATION_TIMEOUT,
        }
    }

    /// Create a registration client with custom settings.
    ///
    /// This is useful for testing against a mock collector.
    pub fn with_settings(
        register_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistrationError> {
        let client = Client::builder()
            .build()
            .map_err(|e| RegistrationError::Client(e.to_string()))?;

        Ok(Self {
            client,
            register_url: register_url.into(),
            timeout,
        })
    }

    /// Exchange a one-time registration token for the long-lived API key.
    ///
    /// On success the key is persisted through `store` before this method
    /// returns, so a crash after registration never loses the credential.
    ///
    /// # Errors
    ///
    /// - `Rejected` when the collector answers with a non-2xx status
    /// - `Network` when the request cannot be completed
    /// - `Malformed` when the response carries no usable `api_key`
    /// - `Store` when persisting the issued key fails
    pub async fn register(
        &self,
        token: &str,
        store: &CredentialStore,
    ) -> Result<String, RegistrationError> {
        let device_identifier = identity::resolve();

        info!(
            device_identifier = %device_identifier,
            url = %self.register_url,
            "Registering agent with collector"
        );

        let body = RegisterRequest {
            registration_token: token,
            device_identifier,
        };

        let response = self
            .client
            .post(&self.register_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(RegistrationError::Rejected { status, body });
        }

        let issued: RegisterResponse = response
            .json()
            .await
            .map_err(|e| RegistrationError::Malformed(e.to_string()))?;

        let api_key = match issued.api_key {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(RegistrationError::Malformed(
                    "response did not contain an api_key".to_string(),
                ))
            }
        };

        store.save(&api_key)?;

        debug!("Registration succeeded, credential persisted");
        Ok(api_key)
    }
}
