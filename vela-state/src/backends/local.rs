//! Local file backend for state storage
//!
//! State is a pretty-printed JSON file (default: `vela.state.json`). A sibling
//! `.lock` file, created exclusively, guards it against concurrent runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "vela.state.json";

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let path = config.get_string("path").unwrap_or(Self::DEFAULT_STATE_FILE);
        if path.trim().is_empty() {
            return Err(BackendError::configuration("local backend `path` is empty"));
        }
        Ok(Self::with_path(path))
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        }
    }

    /// Create the lock file, failing if it already exists
    async fn create_lock_file(&self, lock: &LockInfo) -> std::io::Result<()> {
        let content = serde_json::to_vec_pretty(lock)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await?;
        file.write_all(&content).await?;
        file.flush().await
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::with_path(Self::DEFAULT_STATE_FILE)
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read state file: {}", e))),
        };

        let state: StateFile = serde_json::from_str(&content)
            .map_err(|e| BackendError::InvalidState(format!("Failed to parse state file: {}", e)))?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "state file version {} is newer than supported version {}",
                state.version,
                StateFile::CURRENT_VERSION
            )));
        }
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            if stored.lineage != state.lineage {
                return Err(BackendError::LineageMismatch {
                    expected: stored.lineage,
                    actual: state.lineage.clone(),
                });
            }
            if stored.serial > state.serial {
                return Err(BackendError::StaleSerial {
                    stored: stored.serial,
                    writing: state.serial,
                });
            }
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize state: {}", e)))?;

        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::Io(format!("Failed to create state directory: {}", e)))?;
        }

        // Write then rename so a crash never leaves a truncated state file
        let tmp_path = self.state_path.with_extension("tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;

        debug!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock().await? {
            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }
            warn!(
                "taking over expired lock {} held by {}",
                existing.id, existing.who
            );
            self.remove_lock_file().await?;
        }

        let lock = LockInfo::new(operation);
        match self.create_lock_file(&lock).await {
            Ok(()) => Ok(lock),
            // Another run created the lock between our check and create
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match self.read_lock().await? {
                Some(holder) => Err(BackendError::locked(&holder)),
                None => Err(BackendError::Io("lock file vanished while locking".to_string())),
            },
            Err(e) => Err(BackendError::Io(format!("Failed to write lock file: {}", e))),
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock_file().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock().await {
            Ok(None) => return Err(BackendError::LockNotFound(lock_id.to_string())),
            Ok(Some(existing)) if existing.id != lock_id => {
                return Err(BackendError::LockMismatch {
                    expected: lock_id.to_string(),
                    actual: existing.id,
                });
            }
            // An unparsable lock file can still be removed by force
            Ok(Some(_)) | Err(BackendError::InvalidState(_)) => {}
            Err(e) => return Err(e),
        }
        self.remove_lock_file().await
    }
}
