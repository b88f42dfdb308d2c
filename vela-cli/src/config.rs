//! Configuration file loading
//!
//! A configuration is a JSON document listing the desired resources:
//!
//! ```json
//! { "resources": [ { "type": "azurerm_impact_connectors", "name": "main",
//!                    "attributes": { "name": "conn", "connector_type": "AzureMonitor" } } ] }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use vela_core::resource::{Resource, ResourceId, Value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    resources: Vec<ResourceBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceBlock {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
}

/// Parse configuration text into resources, in file order
pub fn parse(content: &str) -> Result<Vec<Resource>, String> {
    let file: ConfigFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

    let mut seen = HashSet::new();
    let mut resources = Vec::with_capacity(file.resources.len());
    for block in file.resources {
        if block.name.trim().is_empty() {
            return Err(format!("{}: resource name is empty", block.resource_type));
        }
        let id = ResourceId::new(&block.resource_type, &block.name);
        if !seen.insert(id.clone()) {
            return Err(format!("{}: declared more than once", id));
        }

        let attributes = block
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        resources.push(Resource { id, attributes });
    }
    Ok(resources)
}

pub fn load(path: &Path) -> Result<Vec<Resource>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
}
