//! Best-effort on-disk cache of the session tokens.
//!
//! Losing this file only costs one extra login, so neither direction is
//! allowed to fail the caller: [`CredentialStore::load`] turns every problem
//! into `None`, and [`CredentialStore::save`] errors are only logged by the
//! session.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Session fields that survive a restart.
///
/// Serialized as `{"deviceId", "accessToken", "refreshToken", "expiresAt"}`
/// with `expiresAt` in Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub device_id: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

/// JSON file holding a [`PersistedState`]. Single writer, no locking.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached state. Missing, unreadable, or malformed files yield `None`.
    pub async fn load(&self) -> Option<PersistedState> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No session cache at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read session cache {}: {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_slice::<PersistedState>(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed session cache {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Write the state, creating parent directories as needed.
    pub async fn save(&self, state: &PersistedState) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Io(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            Error::Io(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("Saved session cache to {}", self.path.display());
        Ok(())
    }
}
