//! Endpoint Agent - Host liveness and log reporting service
//!
//! The agent registers itself once with a remote collector using a one-time
//! token, persists the issued API key, then continuously reports liveness
//! (heartbeats) and telemetry (log events) until terminated.
//!
//! ## Usage
//!
//! First run, with a token obtained from the collector operator:
//!
//! ```text
//! endpoint-agent --register <TOKEN>
//! ```
//!
//! Subsequent runs reuse the persisted credential:
//!
//! ```text
//! endpoint-agent
//! ```
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `ENDPOINT_AGENT_SERVER_URL`: Collector base URL (default: http://localhost:3000)
//! - `ENDPOINT_AGENT_CREDENTIAL_PATH`: Credential file path (default: agent_config.json)
//! - `RUST_LOG`: Logging level filter (default: info)

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use endpoint_agent::config::Config;
use endpoint_agent::supervisor::{AgentError, Mode, Supervisor};

/// Endpoint agent reporting host liveness and log telemetry to a collector.
#[derive(Debug, Parser)]
#[command(name = "endpoint-agent", version)]
struct Cli {
    /// Register this agent with the collector using a one-time token
    #[arg(long, value_name = "TOKEN")]
    register: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                server_url = %config.server_url,
                credential_path = %config.credential_path.display(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "Failed to initialize agent");
            std::process::exit(1);
        }
    };

    let mode = match cli.register {
        Some(token) => Mode::Register { token },
        None => Mode::Serve,
    };

    if let Err(e) = supervisor.run(mode).await {
        match &e {
            AgentError::NotRegistered => {
                error!("Agent is not registered. Use --register <TOKEN> to get started.");
            }
            AgentError::CorruptCredentials(_) => {
                error!(error = %e, "Stored credential is unusable. Please re-register with --register <TOKEN>.");
            }
            _ => {
                error!(error = %e, "Agent exited with error");
            }
        }
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
