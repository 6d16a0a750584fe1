//! Credential persistence for the endpoint agent.
//!
//! The collector issues a long-lived API key at registration time. This
//! module owns that credential on disk: it is the only state that survives
//! process restarts. The stored representation is a JSON object
//! `{"api_key": "..."}`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Persisted credential file contents.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default)]
    api_key: Option<String>,
}

/// Errors that can occur while loading or saving the credential.
#[derive(Debug)]
pub enum CredentialStoreError {
    /// No credential file exists; the agent has never registered
    NotFound,

    /// The credential file exists but is unreadable or missing the key
    Corrupt(String),

    /// Reading or writing the credential file failed
    Io(io::Error),
}

impl std::fmt::Display for CredentialStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStoreError::NotFound => write!(f, "No stored credential found"),
            CredentialStoreError::Corrupt(reason) => {
                write!(f, "Stored credential is corrupt: {}", reason)
            }
            CredentialStoreError::Io(e) => write!(f, "Credential storage I/O failed: {}", e),
        }
    }
}

impl std::error::Error for CredentialStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CredentialStoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CredentialStoreError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            CredentialStoreError::NotFound
        } else {
            CredentialStoreError::Io(err)
        }
    }
}

/// Local store for the agent's long-lived credential.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a concurrent reader never observes a partially written file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no credential file exists
    /// - `Corrupt` if the file cannot be parsed, or the `api_key` field is
    ///   missing, null, or empty
    /// - `Io` for any other read failure
    pub fn load(&self) -> Result<String, CredentialStoreError> {
        let contents = fs::read_to_string(&self.path)?;

        let stored: StoredCredential = serde_json::from_str(&contents)
            .map_err(|e| CredentialStoreError::Corrupt(e.to_string()))?;

        match stored.api_key {
            Some(key) if !key.is_empty() => Ok(key),
            Some(_) => Err(CredentialStoreError::Corrupt(
                "api_key field is empty".to_string(),
            )),
            None => Err(CredentialStoreError::Corrupt(
                "api_key field is missing".to_string(),
            )),
        }
    }

    /// Persist the credential, replacing any previously stored one.
    ///
    /// The write is atomic: the serialized state is written to a temp file
    /// next to the target and renamed into place.
    pub fn save(&self, api_key: &str) -> Result<(), CredentialStoreError> {
        let stored = StoredCredential {
            api_key: Some(api_key.to_string()),
        };
        let contents = serde_json::to_string(&stored)
            .map_err(|e| CredentialStoreError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(CredentialStoreError::Io)?;
            }
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, contents).map_err(CredentialStoreError::Io)?;
        fs::rename(&tmp_path, &self.path).map_err(CredentialStoreError::Io)?;

        debug!(path = %self.path.display(), "Credential persisted");
        Ok(())
    }

    /// Path of the temp file used for atomic replacement.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
