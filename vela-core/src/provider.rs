//! Provider - Trait abstracting resource operations
//!
//! A Provider exposes the resource types of one remote API (e.g. Azure
//! Resource Manager) and routes lifecycle calls to the matching type.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;
use crate::resource::{Resource, ResourceId, State};
use crate::schema::{ResourceSchema, TypeError};

/// Lifecycle operation, used to label timeouts and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// Error type for Provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configuration document does not fit the resource schema
    #[error("decoding {resource}: {}", join_errors(errors))]
    Decode {
        resource: String,
        errors: Vec<TypeError>,
    },

    /// A persisted identifier could not be parsed
    #[error("parsing identifier {input:?}: {message}")]
    InvalidIdentifier { input: String, message: String },

    /// Reading the remote resource failed
    #[error("retrieving {id}: {source}")]
    Retrieval {
        id: String,
        #[source]
        source: ClientError,
    },

    /// The resource to create already exists remotely
    #[error(
        "A resource with the ID {id:?} already exists - to be managed via Vela this resource needs to be imported into the State. Please see the resource documentation for {resource_type:?} for more information."
    )]
    ImportRequired { resource_type: String, id: String },

    /// The resource to import does not exist remotely
    #[error("cannot import non-existent remote object {id}")]
    ImportNotFound { id: String },

    /// Creating or updating the remote resource failed
    #[error("creating/updating {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: ClientError,
    },

    /// Deleting the remote resource failed
    #[error("deleting {id}: {source}")]
    Delete {
        id: String,
        #[source]
        source: ClientError,
    },

    /// A force-new attribute changed, an in-place update is impossible
    #[error("updating {id}: {} cannot be changed in place, the resource must be replaced", attributes.join(", "))]
    RequiresReplacement { id: String, attributes: Vec<String> },

    /// The remote API answered with a payload that does not decode
    #[error("retrieving {id}: {message}")]
    MalformedResponse { id: String, message: String },

    /// The operation exceeded its deadline
    #[error("{operation} of {id} timed out after {}s", after.as_secs())]
    Timeout {
        operation: Operation,
        id: String,
        after: Duration,
    },

    /// No handler is registered for the resource type
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),
}

fn join_errors(errors: &[TypeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Decode error for a single offending attribute
    pub fn decode_attribute(resource: impl Into<String>, error: TypeError) -> Self {
        ProviderError::Decode {
            resource: resource.into(),
            errors: vec![error],
        }
    }

    /// Whether this error asks the user to import the resource
    pub fn is_import_required(&self) -> bool {
        matches!(self, ProviderError::ImportRequired { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Main Provider trait
///
/// Each remote API implements this trait. All operations are async and
/// involve side effects on the remote side.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "azurerm")
    fn name(&self) -> &'static str;

    /// Schemas of the resource types this Provider can handle
    fn resource_types(&self) -> Vec<ResourceSchema>;

    /// Schema for a single resource type
    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.resource_types()
            .into_iter()
            .find(|s| s.resource_type == resource_type)
    }

    /// Get the current state of a resource by its remote identifier
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the remote resource ID.
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    ///
    /// `from` is the recorded state; only attributes that differ between it
    /// and `to` are sent to the remote API.
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Adopt an existing remote resource
    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let state = self.read(&id, &identifier).await?;
            if !state.exists {
                return Err(ProviderError::ImportNotFound { id: identifier });
            }
            Ok(state)
        })
    }
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<ResourceSchema> {
        (**self).resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier)
    }
}
