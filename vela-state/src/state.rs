//! State file structures

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vela_core::resource::{ResourceId, State, Value};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of Vela that last modified this state
    pub vela_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file with a fresh lineage
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            vela_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Bump the serial and stamp the current Vela version before a write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.vela_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Add or replace the entry for a resource
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }

    /// Recorded state of a resource, or `State::not_found` when untracked
    pub fn current(&self, id: &ResourceId) -> State {
        self.find_resource(id)
            .map(ResourceState::to_state)
            .unwrap_or_else(|| State::not_found(id.clone()))
    }

    /// Record the outcome of a lifecycle operation
    ///
    /// A state that no longer exists removes the entry.
    pub fn record(&mut self, state: &State, provider: &str) {
        if state.exists {
            self.upsert_resource(ResourceState::from_state(state, provider));
        } else {
            self.remove_resource(&state.id);
        }
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "azurerm_impact_connectors")
    pub resource_type: String,
    /// Resource name (the key given in the configuration file)
    pub name: String,
    /// Provider name (e.g., "azurerm")
    pub provider: String,
    /// Remote identifier (e.g., an ARM resource ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// All attributes of the resource as JSON values
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn from_state(state: &State, provider: &str) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.to_string(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        let state = State::existing(self.id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }
}
