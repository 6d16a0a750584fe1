//! Endpoint Agent Library
//!
//! This library provides the components of a long-running endpoint agent
//! that reports to a remote collector:
//!
//! - **config**: Environment-based configuration for the agent
//! - **identity**: Stable device identifier derived from host network hardware
//! - **credentials**: Persistence for the long-lived API key
//! - **registration**: One-time token-for-credential enrollment handshake
//! - **events**: Log event model and event source abstraction
//! - **heartbeat**: Periodic liveness reporting loop
//! - **telemetry**: Periodic log shipping loop
//! - **supervisor**: Credential lifecycle, loop orchestration, graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use endpoint_agent::config::Config;
//! use endpoint_agent::supervisor::{Mode, Supervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Load configuration from environment
//!     let config = Config::from_env().expect("Failed to load config");
//!
//!     // Serve with the previously persisted credential
//!     let supervisor = Supervisor::new(config).expect("Failed to create supervisor");
//!     supervisor.run(Mode::Serve).await.expect("Agent exited with error");
//! }
//! ```

// Module declarations
pub mod config;
pub mod credentials;
pub mod events;
pub mod heartbeat;
pub mod identity;
pub mod registration;
pub mod supervisor;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use config::{Config, ConfigError};
pub use credentials::{CredentialStore, CredentialStoreError};
pub use events::{EventSource, HostStatusSource, LogData, LogEvent};
pub use heartbeat::HeartbeatLoop;
pub use registration::{RegistrationClient, RegistrationError};
pub use supervisor::{AgentError, Mode, Supervisor};
pub use telemetry::TelemetryLoop;
