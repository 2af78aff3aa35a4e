//! JSON state file.
//!
//! [`JsonFileStore`] keeps the last accepted snapshot as one pretty-printed
//! UTF-8 document: a top-level object of record id → flat field object.
//! Saves go to a sibling temp file that is then renamed over the target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use rxwatch_core::snapshot::Snapshot;
use rxwatch_core::store::StateStore;

/// Error type for state file failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is not a valid snapshot: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// File-backed [`StateStore`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> StoreError {
        StoreError::Json {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    type Error = StoreError;

    async fn load(&self) -> Result<Snapshot, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    "No state file yet, starting from an empty baseline"
                );
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| self.json_error(e))?;
        tracing::info!(
            path = %self.path.display(),
            records = snapshot.len(),
            "State file loaded"
        );
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|e| self.json_error(e))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!(
            path = %self.path.display(),
            records = snapshot.len(),
            "State file saved"
        );
        Ok(())
    }
}
