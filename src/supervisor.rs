//! Agent supervisor: credential lifecycle, loop orchestration, shutdown.
//!
//! The supervisor either drives the one-time registration handshake or
//! loads the persisted credential, then runs the heartbeat and telemetry
//! loops concurrently under one shared cancellation signal. An OS
//! termination signal sets the signal; the heartbeat task is then joined
//! with a bounded timeout so shutdown can never hang on a stuck loop.

use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::credentials::{CredentialStore, CredentialStoreError};
use crate::events::HostStatusSource;
use crate::heartbeat::HeartbeatLoop;
use crate::registration::{RegistrationClient, RegistrationError};
use crate::telemetry::TelemetryLoop;

/// Bound on waiting for the heartbeat task during shutdown.
///
/// Covers the cancellation poll latency plus one in-flight request timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Operating mode selected on the command line.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Perform the one-time registration handshake, then serve
    Register { token: String },

    /// Serve with the previously persisted credential
    Serve,
}

/// Errors that abort the agent before the loops start.
///
/// Nothing that happens after serving begins is fatal; loop-level failures
/// are contained inside the loops themselves.
#[derive(Debug)]
pub enum AgentError {
    /// No persisted credential; the operator must register first
    NotRegistered,

    /// The persisted credential is unreadable; the operator must re-register
    CorruptCredentials(CredentialStoreError),

    /// Credential storage failed for another reason
    Store(CredentialStoreError),

    /// The registration handshake failed
    Registration(RegistrationError),

    /// The HTTP client could not be built
    Client(String),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::NotRegistered => write!(f, "Agent is not registered"),
            AgentError::CorruptCredentials(e) => {
                write!(f, "Stored credential is unusable: {}", e)
            }
            AgentError::Store(e) => write!(f, "Credential storage failed: {}", e),
            AgentError::Registration(e) => write!(f, "Registration failed: {}", e),
            AgentError::Client(e) => write!(f, "HTTP client error: {}", e),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::CorruptCredentials(e) | AgentError::Store(e) => Some(e),
            AgentError::Registration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistrationError> for AgentError {
    fn from(err: RegistrationError) -> Self {
        AgentError::Registration(err)
    }
}

/// Owns the configuration, credential store, and shared HTTP client, and
/// drives the agent through registration and serving.
pub struct Supervisor {
    config: Config,
    store: CredentialStore,
    client: Client,
}

impl Supervisor {
    /// Create a supervisor from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Client` if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, AgentError> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AgentError::Client(e.to_string()))?;

        let store = CredentialStore::new(config.credential_path.clone());

        Ok(Self {
            config,
            store,
            client,
        })
    }

    /// Run the agent in the given mode.
    ///
    /// In register mode a successful handshake transitions directly into
    /// serving with the new credential. In serve mode the persisted
    /// credential is loaded first. Serving continues until an OS
    /// termination signal arrives.
    pub async fn run(&self, mode: Mode) -> Result<(), AgentError> {
        match mode {
            Mode::Register { token } => {
                let registration =
                    RegistrationClient::new(self.client.clone(), self.config.register_url.clone());
                let api_key = registration.register(&token, &self.store).await?;

                info!("Registration successful, credential stored");
                self.serve(api_key).await;
                Ok(())
            }
            Mode::Serve => {
                let api_key = self.store.load().map_err(|e| match e {
                    CredentialStoreError::NotFound => AgentError::NotRegistered,
                    CredentialStoreError::Corrupt(_) => AgentError::CorruptCredentials(e),
                    CredentialStoreError::Io(_) => AgentError::Store(e),
                })?;

                self.serve(api_key).await;
                Ok(())
            }
        }
    }

    /// Run both reporting loops until shutdown.
    ///
    /// The heartbeat loop runs as a spawned task; the telemetry loop runs
    /// on the invoking task. A signal watcher sets the shared cancellation
    /// signal, after which the telemetry loop exits on its own and the
    /// heartbeat task is joined with a bounded timeout.
    async fn serve(&self, api_key: String) {
        let cancel = CancellationToken::new();

        let heartbeat = HeartbeatLoop::new(
            self.client.clone(),
            self.config.heartbeat_url.clone(),
            api_key.clone(),
        );
        let heartbeat_handle = tokio::spawn(heartbeat.run(cancel.clone()));

        let watcher_cancel = cancel.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => info!("Shutdown signal received, stopping..."),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            watcher_cancel.cancel();
        });

        let telemetry = TelemetryLoop::new(
            self.client.clone(),
            self.config.ingest_url.clone(),
            api_key,
            Box::new(HostStatusSource::new()),
        );

        info!("Agent running. Press Ctrl+C to stop.");
        telemetry.run(cancel.clone()).await;

        match tokio::time::timeout(SHUTDOWN_GRACE, heartbeat_handle).await {
            Ok(Ok(())) => info!("Heartbeat loop shut down gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Heartbeat task panicked during shutdown"),
            Err(_) => warn!("Heartbeat shutdown timed out after {:?}", SHUTDOWN_GRACE),
        }

        info!("Agent stopped");
    }
}

/// Wait for a termination signal.
///
/// SIGINT and SIGTERM on unix (systemd sends SIGTERM), Ctrl-C elsewhere.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

/// Wait for a termination signal.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSource, LogEvent};
    use std::path::PathBuf;

    fn config_with_store(dir: &tempfile::TempDir, server_url: &str) -> Config {
        Config::with_server_url(server_url, dir.path().join("agent_config.json"))
    }

    struct EmptySource;

    impl EventSource for EmptySource {
        fn collect(&mut self) -> Vec<LogEvent> {
            Vec::new()
        }
    }

    /// URL of a port nothing is listening on.
    fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_serve_mode_without_credential() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_store(&dir, "http://localhost:3000");

        let supervisor = Supervisor::new(config).unwrap();
        let err = supervisor.run(Mode::Serve).await.unwrap_err();

        assert!(matches!(err, AgentError::NotRegistered));
    }

    #[tokio::test]
    async fn test_serve_mode_with_corrupt_credential() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_store(&dir, "http://localhost:3000");
        std::fs::write(&config.credential_path, "{}").unwrap();

        let supervisor = Supervisor::new(config).unwrap();
        let err = supervisor.run(Mode::Serve).await.unwrap_err();

        assert!(matches!(err, AgentError::CorruptCredentials(_)));
    }

    #[tokio::test]
    async fn test_register_mode_rejection_starts_no_loop() {
        let mut server = mockito::Server::new_async().await;
        let _register = server
            .mock("POST", "/api/agents/register")
            .with_status(400)
            .with_body("bad token")
            .create_async()
            .await;
        let heartbeat = server
            .mock("POST", "/api/agents/heartbeat")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_with_store(&dir, &server.url());

        let supervisor = Supervisor::new(config).unwrap();
        let err = supervisor
            .run(Mode::Register {
                token: "bad".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::Registration(RegistrationError::Rejected { .. })
        ));
        heartbeat.assert_async().await;
    }

    #[tokio::test]
    async fn test_both_loops_stop_after_immediate_cancellation() {
        let client = Client::new();
        let base = unreachable_url();
        let cancel = CancellationToken::new();

        let hb = HeartbeatLoop::with_settings(
            client.clone(),
            format!("{}/api/agents/heartbeat", base),
            "key",
            Duration::from_millis(50),
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        let tl = TelemetryLoop::with_settings(
            client,
            format!("{}/api/ingestion/logs", base),
            "key",
            Box::new(EmptySource),
            Duration::from_millis(50),
            Duration::from_millis(200),
        );

        let hb_handle = tokio::spawn(hb.run(cancel.clone()));
        let tl_handle = tokio::spawn(tl.run(cancel.clone()));

        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), async {
            hb_handle.await.unwrap();
            tl_handle.await.unwrap();
        })
        .await
        .expect("loops did not stop after cancellation");
    }

    #[test]
    fn test_agent_error_display() {
        assert_eq!(
            format!("{}", AgentError::NotRegistered),
            "Agent is not registered"
        );

        let err = AgentError::Store(CredentialStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )));
        assert!(format!("{}", err).contains("denied"));
    }

    #[test]
    fn test_supervisor_construction() {
        let config = Config::with_server_url(
            "http://localhost:3000",
            PathBuf::from("agent_config.json"),
        );
        assert!(Supervisor::new(config).is_ok());
    }
}
