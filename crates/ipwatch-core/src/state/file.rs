// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: new state goes to a temporary file, then renamed over
//   the live one, so a crash leaves either the old or the new value on
//   disk, never a truncated one
// - Automatic backup: the last known good state is kept in a `.backup` file
// - Corruption detection: JSON is validated on load; a corrupt main file
//   falls back to the backup, and a corrupt backup falls back to first-run
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "state": {
//     "address": "1.2.3.4",
//     "city": "Lisbon",
//     "region": null,
//     "country": "Portugal",
//     "updated_at": "2025-01-09T12:00:00Z"
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{LastKnownState, StateStore};

/// State file format version, for future migration
const STATE_FILE_VERSION: &str = "1";

/// File-based state store with crash recovery.
///
/// Holds the single last-known observation; the in-memory copy is the
/// source of truth between writes and every `store()` is flushed to disk
/// immediately.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<CachedState>>,
}

#[derive(Debug)]
struct CachedState {
    value: Option<LastKnownState>,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    state: Option<LastKnownState>,
}

impl FileStateStore {
    /// Create or load a file state store.
    ///
    /// Creates parent directories if needed, then loads the existing state
    /// file, recovering from the backup if the main file is corrupted.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let value = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(CachedState {
                value,
                dirty: false,
            })),
        })
    }

    /// Load state, falling back to the backup on corruption.
    async fn load_with_recovery(path: &Path) -> Result<Option<LastKnownState>, Error> {
        match Self::load_file(path).await {
            Ok(value) => Ok(value),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "state file appears corrupted: {}. attempting recovery from backup",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("no backup file found, starting with empty state");
                    return Ok(None);
                }

                match Self::load_file(&backup_path).await {
                    Ok(value) => {
                        tracing::info!("recovered state from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "failed to restore state file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(value)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "backup also corrupted: {}. starting with empty state",
                            backup_err
                        );
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load and parse one state file. Missing file is first-run, not error.
    async fn load_file(path: &Path) -> Result<Option<LastKnownState>, Error> {
        if !path.exists() {
            tracing::debug!("state file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::storage(format!("failed to read state file {}: {}", path.display(), e))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "state file version mismatch: expected {}, got {}. loading anyway",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.state)
    }

    /// Write the cached state to disk atomically.
    async fn write_state(&self) -> Result<(), Error> {
        let json = {
            let guard = self.state.read().await;
            let state_file = StateFileFormat {
                version: STATE_FILE_VERSION.to_string(),
                state: guard.value.clone(),
            };
            serde_json::to_string_pretty(&state_file)?
        };

        // Write to a temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::storage(format!(
                    "failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the previous good state as backup
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        let mut guard = self.state.write().await;
        guard.dirty = false;

        tracing::trace!("state written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Option<LastKnownState>, Error> {
        let guard = self.state.read().await;
        Ok(guard.value.clone())
    }

    async fn store(&self, state: &LastKnownState) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.value = Some(state.clone());
            guard.dirty = true;
        }

        // Immediate write for durability
        self.write_state().await
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write_state().await } else { Ok(()) }
    }
}
