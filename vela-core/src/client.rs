//! Remote client - Contract for the resource-management API
//!
//! Resource types talk to the remote API only through [`RemoteClient`]. The
//! contract is deliberately small: get, create-or-update and delete by
//! resource identifier, with not-found distinguishable from other failures.

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a remote client
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The remote API answered 404 for the identifier
    #[error("resource not found")]
    NotFound,

    /// The remote API rejected the request
    #[error("unexpected status {status}{}: {message}", code.as_ref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A long-running operation finished in a non-success state
    #[error("long-running operation ended with status {status}: {message}")]
    OperationFailed { status: String, message: String },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// Request or response body could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}

/// Result type for remote client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Typed handle on the remote resource-management API
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch a resource
    ///
    /// Returns `Ok(None)` when the remote API reports the resource as absent.
    async fn get(&self, id: &str, api_version: &str) -> ClientResult<Option<serde_json::Value>>;

    /// Create or replace a resource with the given body
    async fn create_or_update(
        &self,
        id: &str,
        api_version: &str,
        body: serde_json::Value,
    ) -> ClientResult<serde_json::Value>;

    /// Delete a resource
    ///
    /// Returns `Err(ClientError::NotFound)` when the resource is absent.
    async fn delete(&self, id: &str, api_version: &str) -> ClientResult<()>;
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryClient;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{ClientError, ClientResult, RemoteClient};

    /// In-process remote API keyed by case-insensitive identifier
    ///
    /// Counts write calls and can be told to fail or stall, so lifecycle
    /// behaviour can be asserted without a network.
    #[derive(Default)]
    pub struct MemoryClient {
        resources: Mutex<HashMap<String, serde_json::Value>>,
        writes: AtomicUsize,
        fail_with: Mutex<Option<ClientError>>,
        delay: Mutex<Option<Duration>>,
    }

    impl MemoryClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a resource as if the server held it
        pub fn insert(&self, id: &str, resource: serde_json::Value) {
            self.resources
                .lock()
                .unwrap()
                .insert(id.to_lowercase(), resource);
        }

        /// Current server-side copy of a resource
        pub fn resource(&self, id: &str) -> Option<serde_json::Value> {
            self.resources.lock().unwrap().get(&id.to_lowercase()).cloned()
        }

        /// Number of create-or-update calls received
        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Make every subsequent call fail with the given error
        pub fn fail_with(&self, error: ClientError) {
            *self.fail_with.lock().unwrap() = Some(error);
        }

        /// Make every subsequent call wait before answering
        pub fn delay_by(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        async fn prelude(&self) -> ClientResult<()> {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match self.fail_with.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RemoteClient for MemoryClient {
        async fn get(&self, id: &str, _api_version: &str) -> ClientResult<Option<serde_json::Value>> {
            self.prelude().await?;
            Ok(self.resource(id))
        }

        async fn create_or_update(
            &self,
            id: &str,
            _api_version: &str,
            mut body: serde_json::Value,
        ) -> ClientResult<serde_json::Value> {
            self.prelude().await?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(object) = body.as_object_mut() {
                object.insert("id".to_string(), serde_json::Value::String(id.to_string()));
                if let Some(name) = id.rsplit('/').next() {
                    object.insert("name".to_string(), serde_json::Value::String(name.to_string()));
                }
            }
            self.insert(id, body.clone());
            Ok(body)
        }

        async fn delete(&self, id: &str, _api_version: &str) -> ClientResult<()> {
            self.prelude().await?;
            match self.resources.lock().unwrap().remove(&id.to_lowercase()) {
                Some(_) => Ok(()),
                None => Err(ClientError::NotFound),
            }
        }
    }
}
