//! Storage contract for the state file
//!
//! A backend stores one [`StateFile`] and serializes writers through a lock.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use vela_core::resource::Value;

use crate::lock::LockInfo;
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Another run holds an unexpired lock
    #[error("state is locked by {who} for `{operation}` (lock {lock_id})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("no lock {0} is held")]
    LockNotFound(String),

    #[error("lock {actual} is held, not {expected}")]
    LockMismatch { expected: String, actual: String },

    #[error("backend type {0:?} is not supported")]
    UnsupportedBackend(String),

    #[error("backend configuration: {0}")]
    Configuration(String),

    /// The stored document cannot be understood
    #[error("unreadable state: {0}")]
    InvalidState(String),

    /// The stored state belongs to a different lineage
    #[error("state lineage {actual} does not match stored lineage {expected}")]
    LineageMismatch { expected: String, actual: String },

    /// The stored state is newer than the one being written
    #[error("state serial {stored} is newer than {writing}; refresh before writing")]
    StaleSerial { stored: u64, writing: u64 },

    #[error("state I/O: {0}")]
    Io(String),

    #[error("state encoding: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn locked(holder: &LockInfo) -> Self {
        BackendError::Locked {
            lock_id: holder.id.clone(),
            who: holder.who.clone(),
            operation: holder.operation.clone(),
        }
    }

    pub fn unsupported_backend(name: impl Into<String>) -> Self {
        BackendError::UnsupportedBackend(name.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        BackendError::Configuration(message.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `None` until the first write
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Persist `state`, refusing a foreign lineage or a serial older than the stored one
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Take the lock for `operation`; an expired lock may be taken over
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Drop the lock with this ID whoever holds it
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

/// Where and how state is stored
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// `local` is the only kind so far
    pub backend_type: String,
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    /// Local backend storing state at `path`
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            backend_type: "local".to_string(),
            attributes: HashMap::from([("path".to_string(), Value::String(path.into()))]),
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_error_names_the_holder() {
        let holder = LockInfo::new("destroy");
        let error = BackendError::locked(&holder);

        let BackendError::Locked {
            lock_id, operation, ..
        } = &error
        else {
            panic!("not a lock error: {error}");
        };
        assert_eq!(lock_id, &holder.id);
        assert_eq!(operation, "destroy");
        assert!(error.to_string().contains(&holder.who));
    }

    #[test]
    fn error_display() {
        let error = BackendError::unsupported_backend("s3");
        assert_eq!(error.to_string(), "backend type \"s3\" is not supported");

        let error = BackendError::StaleSerial {
            stored: 4,
            writing: 3,
        };
        assert_eq!(
            error.to_string(),
            "state serial 4 is newer than 3; refresh before writing"
        );
    }

    #[test]
    fn local_config() {
        let config = BackendConfig::local("state/vela.json");
        assert_eq!(config.backend_type, "local");
        assert_eq!(config.get_string("path"), Some("state/vela.json"));
        assert_eq!(config.get_string("missing"), None);
    }
}
