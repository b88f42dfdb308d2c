//! Wire models shared by ARM resource types

use serde::{Deserialize, Serialize};

/// Top-level ARM resource body
///
/// Server-populated fields (`id`, `name`, `type`, `etag`) are read back and
/// sent again on update, so a fetched resource can be modified and written
/// without losing them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEnvelope<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<P>,
}

impl<P> ResourceEnvelope<P> {
    /// A new body carrying only properties
    pub fn with_properties(properties: P) -> Self {
        Self {
            id: None,
            name: None,
            resource_type: None,
            etag: None,
            properties: Some(properties),
        }
    }

    /// Properties, or the message ARM resources report when they are absent
    pub fn properties_mut(&mut self) -> Result<&mut P, String> {
        self.properties
            .as_mut()
            .ok_or_else(|| "`properties` was nil".to_string())
    }
}
