//! Vela Azure Resource Manager Provider
//!
//! ## Module Structure
//!
//! - `client` - HTTP client for the ARM REST API
//! - `config` - Provider settings from environment and flags
//! - `datafactory` - `azurerm_data_factory_linked_custom_service`
//! - `impact` - `azurerm_impact_connectors`
//! - `ids` - ARM resource identifiers
//! - `models` - Wire models shared across resource types
//! - `resources` - Registry of supported resource types
//! - `validate` - Attribute validators

pub mod client;
pub mod config;
pub mod datafactory;
pub mod ids;
pub mod impact;
pub mod models;
pub mod resources;
pub mod validate;

use std::sync::Arc;

use vela_core::client::{ClientResult, RemoteClient};
use vela_core::lifecycle::{Account, ProviderContext, ResourceHandler};
use vela_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State};
use vela_core::schema::ResourceSchema;

pub use client::ArmClient;
pub use config::{ConfigError, ConfigOverrides, ProviderConfig};

/// Azure Resource Manager provider
pub struct AzurermProvider {
    ctx: ProviderContext,
    handlers: Vec<Box<dyn ResourceHandler>>,
}

impl AzurermProvider {
    /// Provider talking to ARM over HTTPS
    pub fn new(config: &ProviderConfig) -> ClientResult<Self> {
        let client = ArmClient::new(config)?;
        Ok(Self::with_client(Arc::new(client), config.account()))
    }

    /// Provider using the given remote client
    pub fn with_client(client: Arc<dyn RemoteClient>, account: Account) -> Self {
        Self {
            ctx: ProviderContext::new(client, account),
            handlers: resources::resource_handlers(),
        }
    }

    fn handler(&self, resource_type: &str) -> ProviderResult<&dyn ResourceHandler> {
        self.handlers
            .iter()
            .find(|h| h.name() == resource_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| ProviderError::UnknownResourceType(resource_type.to_string()))
    }

    /// Validate a configuration and return it as state would record it
    pub fn normalize(&self, resource: &Resource) -> ProviderResult<Resource> {
        self.handler(&resource.id.resource_type)?.normalize(resource)
    }
}

impl Provider for AzurermProvider {
    fn name(&self) -> &'static str {
        "azurerm"
    }

    fn resource_types(&self) -> Vec<ResourceSchema> {
        self.handlers.iter().map(|h| h.schema()).collect()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            self.handler(&id.resource_type)?
                .read(&self.ctx, &id, &identifier)
                .await
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            self.handler(&resource.id.resource_type)?
                .create(&self.ctx, &resource)
                .await
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            self.handler(&id.resource_type)?
                .update(&self.ctx, &identifier, &from, &to)
                .await
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            self.handler(&id.resource_type)?
                .delete(&self.ctx, &identifier)
                .await
        })
    }
}
