//! Lifecycle - Generic create/read/update/delete controller
//!
//! Every resource type repeats the same lifecycle: check for an existing
//! remote object before creating, treat not-found on read as "gone", merge
//! only changed attributes on update. [`Lifecycle`] implements that once on
//! top of a [`ManagedResource`], which supplies the type-specific mapping.
//!
//! The remote client and account are passed to every operation through a
//! [`ProviderContext`]; nothing is shared between calls.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::{ClientError, RemoteClient};
use crate::differ::ChangeSet;
use crate::provider::{Operation, ProviderError, ProviderResult};
use crate::resource::{Attributes, Resource, ResourceId, State, Value};
use crate::schema::{ResourceSchema, TypeError};

/// Account the provider operates in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
}

impl Account {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            tenant_id: None,
        }
    }
}

/// Per-operation deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Everything an operation needs from its surroundings
#[derive(Clone)]
pub struct ProviderContext {
    pub client: Arc<dyn RemoteClient>,
    pub account: Account,
}

impl ProviderContext {
    pub fn new(client: Arc<dyn RemoteClient>, account: Account) -> Self {
        Self { client, account }
    }
}

/// Structured remote identifier
pub trait ResourceIdentifier: fmt::Display + Send + Sync + Sized {
    fn parse(input: &str) -> ProviderResult<Self>;
}

/// Type-specific half of a resource: schema, model and expand/flatten mapping
pub trait ManagedResource: Send + Sync {
    /// Typed configuration model
    type Model: Send + Sync;
    /// Remote identifier
    type Id: ResourceIdentifier;
    /// Remote resource body as it travels on the wire
    type Remote: Serialize + DeserializeOwned + Send;

    /// Resource type name (e.g., "azurerm_impact_connectors")
    fn resource_type(&self) -> &'static str;

    /// API version sent with every remote call
    fn api_version(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Build the typed model from an already schema-validated document
    fn decode(&self, attributes: &Attributes<'_>) -> Result<Self::Model, Vec<TypeError>>;

    /// Render the model back into configuration attributes
    ///
    /// Empty collections and unset optionals are omitted.
    fn encode(&self, model: &Self::Model) -> HashMap<String, Value>;

    /// Remote identifier of the object the model describes
    fn resource_id(&self, account: &Account, model: &Self::Model) -> ProviderResult<Self::Id>;

    /// Configuration model → remote body
    fn expand(&self, model: &Self::Model) -> Result<Self::Remote, TypeError>;

    /// Remote body → configuration model
    fn flatten(&self, id: &Self::Id, remote: Self::Remote) -> Result<Self::Model, String>;

    /// Merge the changed attributes of `model` into the fetched remote body
    fn apply_changes(
        &self,
        existing: &mut Self::Remote,
        model: &Self::Model,
        changes: &ChangeSet,
    ) -> Result<(), TypeError>;
}

/// Lifecycle controller for one resource type
pub struct Lifecycle<R> {
    resource: R,
}

impl<R: ManagedResource> Lifecycle<R> {
    pub fn new(resource: R) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Validate a configuration document and decode it into the model
    pub fn decode(&self, config: &Resource) -> ProviderResult<R::Model> {
        let decode_error = |errors| ProviderError::Decode {
            resource: config.id.to_string(),
            errors,
        };
        self.resource
            .schema()
            .validate(&config.attributes)
            .map_err(decode_error)?;
        self.resource
            .decode(&Attributes::new(&config.attributes))
            .map_err(decode_error)
    }

    /// Validate a document and return it in the form state records it
    pub fn normalize(&self, config: &Resource) -> ProviderResult<Resource> {
        let model = self.decode(config)?;
        Ok(Resource {
            id: config.id.clone(),
            attributes: self.resource.encode(&model),
        })
    }

    /// Create the remote object, refusing to adopt one that already exists
    pub async fn create(&self, ctx: &ProviderContext, config: &Resource) -> ProviderResult<State> {
        let label = config.id.to_string();
        self.with_deadline(Operation::Create, &label, async {
            let model = self.decode(config)?;
            let id = self.resource.resource_id(&ctx.account, &model)?.to_string();
            let api_version = self.resource.api_version();

            debug!("checking for presence of existing {}", id);
            match ctx.client.get(&id, api_version).await {
                Ok(None) | Err(ClientError::NotFound) => {}
                Ok(Some(_)) => {
                    return Err(ProviderError::ImportRequired {
                        resource_type: self.resource.resource_type().to_string(),
                        id,
                    });
                }
                Err(source) => return Err(ProviderError::Retrieval { id, source }),
            }

            let remote = self
                .resource
                .expand(&model)
                .map_err(|e| ProviderError::decode_attribute(&label, e))?;
            let body = serde_json::to_value(&remote).map_err(|e| ProviderError::Write {
                id: id.clone(),
                source: ClientError::Serialization(e.to_string()),
            })?;

            info!("creating {}", id);
            ctx.client
                .create_or_update(&id, api_version, body)
                .await
                .map_err(|source| ProviderError::Write {
                    id: id.clone(),
                    source,
                })?;

            Ok(State::existing(config.id.clone(), self.resource.encode(&model)).with_identifier(id))
        })
        .await
    }

    /// Read the remote object; a missing object yields `State::not_found`
    pub async fn read(
        &self,
        ctx: &ProviderContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        self.with_deadline(Operation::Read, identifier, async {
            let parsed = R::Id::parse(identifier)?;
            let remote_id = parsed.to_string();

            debug!("retrieving {}", remote_id);
            let body = match ctx.client.get(&remote_id, self.resource.api_version()).await {
                Ok(Some(body)) => body,
                Ok(None) | Err(ClientError::NotFound) => {
                    warn!("{} was not found, marking {} as gone", remote_id, id);
                    return Ok(State::not_found(id.clone()));
                }
                Err(source) => {
                    return Err(ProviderError::Retrieval {
                        id: remote_id,
                        source,
                    });
                }
            };

            let remote = decode_remote::<R::Remote>(&remote_id, body)?;
            let model = self
                .resource
                .flatten(&parsed, remote)
                .map_err(|message| ProviderError::MalformedResponse {
                    id: remote_id.clone(),
                    message,
                })?;

            Ok(State::existing(id.clone(), self.resource.encode(&model)).with_identifier(remote_id))
        })
        .await
    }

    /// Merge changed attributes into the existing remote object
    ///
    /// Fields the configuration did not change keep whatever the server holds.
    pub async fn update(
        &self,
        ctx: &ProviderContext,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        self.with_deadline(Operation::Update, identifier, async {
            let parsed = R::Id::parse(identifier)?;
            let remote_id = parsed.to_string();
            let model = self.decode(to)?;
            let desired = self.resource.encode(&model);
            let changes = ChangeSet::between(&from.attributes, &desired);

            let schema = self.resource.schema();
        let force_new = schema.force_new_attributes();
            let replaced: Vec<String> = changes
                .changed()
                .filter(|name| force_new.contains(name))
                .map(str::to_string)
                .collect();
            if !replaced.is_empty() {
                return Err(ProviderError::RequiresReplacement {
                    id: remote_id,
                    attributes: replaced,
                });
            }

            let api_version = self.resource.api_version();
            let body = match ctx.client.get(&remote_id, api_version).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    return Err(ProviderError::Retrieval {
                        id: remote_id,
                        source: ClientError::NotFound,
                    });
                }
                Err(source) => {
                    return Err(ProviderError::Retrieval {
                        id: remote_id,
                        source,
                    });
                }
            };

            let mut existing = decode_remote::<R::Remote>(&remote_id, body)?;
            self.resource
                .apply_changes(&mut existing, &model, &changes)
                .map_err(|e| ProviderError::decode_attribute(to.id.to_string(), e))?;
            let body = serde_json::to_value(&existing).map_err(|e| ProviderError::Write {
                id: remote_id.clone(),
                source: ClientError::Serialization(e.to_string()),
            })?;

            info!(
                "updating {} ({})",
                remote_id,
                changes.changed().collect::<Vec<_>>().join(", ")
            );
            ctx.client
                .create_or_update(&remote_id, api_version, body)
                .await
                .map_err(|source| ProviderError::Write {
                    id: remote_id.clone(),
                    source,
                })?;

            Ok(State::existing(to.id.clone(), desired).with_identifier(remote_id))
        })
        .await
    }

    /// Delete the remote object
    ///
    /// A missing object counts as deleted.
    pub async fn delete(&self, ctx: &ProviderContext, identifier: &str) -> ProviderResult<()> {
        self.with_deadline(Operation::Delete, identifier, async {
            let remote_id = R::Id::parse(identifier)?.to_string();

            info!("deleting {}", remote_id);
            match ctx
                .client
                .delete(&remote_id, self.resource.api_version())
                .await
            {
                Ok(()) => Ok(()),
                Err(ClientError::NotFound) => {
                    warn!("{} was already gone", remote_id);
                    Ok(())
                }
                Err(source) => Err(ProviderError::Delete {
                    id: remote_id,
                    source,
                }),
            }
        })
        .await
    }

    async fn with_deadline<T>(
        &self,
        operation: Operation,
        label: &str,
        fut: impl Future<Output = ProviderResult<T>>,
    ) -> ProviderResult<T> {
        let after = self.resource.timeouts().for_operation(operation);
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                operation,
                id: label.to_string(),
                after,
            }),
        }
    }
}

fn decode_remote<T: DeserializeOwned>(id: &str, body: serde_json::Value) -> ProviderResult<T> {
    serde_json::from_value(body).map_err(|e| ProviderError::MalformedResponse {
        id: id.to_string(),
        message: e.to_string(),
    })
}

/// Object-safe view of a [`Lifecycle`], used by providers to dispatch by type name
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn normalize(&self, config: &Resource) -> ProviderResult<Resource>;

    async fn create(&self, ctx: &ProviderContext, config: &Resource) -> ProviderResult<State>;

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State>;

    async fn delete(&self, ctx: &ProviderContext, identifier: &str) -> ProviderResult<()>;
}

#[async_trait]
impl<R: ManagedResource> ResourceHandler for Lifecycle<R> {
    fn name(&self) -> &'static str {
        self.resource.resource_type()
    }

    fn schema(&self) -> ResourceSchema {
        self.resource.schema()
    }

    fn normalize(&self, config: &Resource) -> ProviderResult<Resource> {
        Lifecycle::normalize(self, config)
    }

    async fn create(&self, ctx: &ProviderContext, config: &Resource) -> ProviderResult<State> {
        Lifecycle::create(self, ctx, config).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        Lifecycle::read(self, ctx, id, identifier).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        Lifecycle::update(self, ctx, identifier, from, to).await
    }

    async fn delete(&self, ctx: &ProviderContext, identifier: &str) -> ProviderResult<()> {
        Lifecycle::delete(self, ctx, identifier).await
    }
}
