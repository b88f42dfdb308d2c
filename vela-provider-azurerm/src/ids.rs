//! Azure Resource Manager identifiers
//!
//! ARM identifiers are slash-separated paths of alternating keys and values,
//! e.g. `/subscriptions/{sub}/resourceGroups/{rg}/providers/...`. Keys are
//! matched case-insensitively; identifiers are always formatted canonically.

use std::fmt;

use vela_core::lifecycle::ResourceIdentifier;
use vela_core::provider::{ProviderError, ProviderResult};

/// Placeholder for a captured segment in an id template
const VALUE: &str = "{}";

/// Split an identifier along a template, returning the captured values
fn parse_segments(input: &str, template: &[&str], example: &str) -> ProviderResult<Vec<String>> {
    let invalid = |message: String| ProviderError::InvalidIdentifier {
        input: input.to_string(),
        message,
    };

    let trimmed = input.trim().trim_end_matches('/');
    let Some(path) = trimmed.strip_prefix('/') else {
        return Err(invalid(format!("expected an ID in the format {}", example)));
    };

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != template.len() {
        return Err(invalid(format!(
            "expected {} segments in the format {}, got {}",
            template.len(),
            example,
            segments.len()
        )));
    }

    let mut values = Vec::new();
    for (segment, expected) in segments.iter().zip(template) {
        if *expected == VALUE {
            if segment.is_empty() {
                return Err(invalid(format!("empty segment in {}", example)));
            }
            values.push(segment.to_string());
        } else if !segment.eq_ignore_ascii_case(expected) {
            return Err(invalid(format!(
                "expected segment {:?} but got {:?} (format {})",
                expected, segment, example
            )));
        }
    }
    Ok(values)
}

/// Data Factory: `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.DataFactory/factories/{factory}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryId {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub factory_name: String,
}

impl FactoryId {
    const TEMPLATE: &[&str] = &[
        "subscriptions",
        VALUE,
        "resourceGroups",
        VALUE,
        "providers",
        "Microsoft.DataFactory",
        "factories",
        VALUE,
    ];
    const EXAMPLE: &str = "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/example-resource-group/providers/Microsoft.DataFactory/factories/factoryValue";

    pub fn new(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        factory_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            factory_name: factory_name.into(),
        }
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DataFactory/factories/{}",
            self.subscription_id, self.resource_group_name, self.factory_name
        )
    }
}

impl ResourceIdentifier for FactoryId {
    fn parse(input: &str) -> ProviderResult<Self> {
        let v = parse_segments(input, Self::TEMPLATE, Self::EXAMPLE)?;
        Ok(Self::new(&v[0], &v[1], &v[2]))
    }
}

/// Linked service of a Data Factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedServiceId {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub factory_name: String,
    pub linked_service_name: String,
}

impl LinkedServiceId {
    const TEMPLATE: &[&str] = &[
        "subscriptions",
        VALUE,
        "resourceGroups",
        VALUE,
        "providers",
        "Microsoft.DataFactory",
        "factories",
        VALUE,
        "linkedservices",
        VALUE,
    ];
    const EXAMPLE: &str = "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/example-resource-group/providers/Microsoft.DataFactory/factories/factoryValue/linkedservices/linkedServiceValue";

    /// Linked service `name` inside the given factory
    pub fn new(factory: &FactoryId, linked_service_name: impl Into<String>) -> Self {
        Self {
            subscription_id: factory.subscription_id.clone(),
            resource_group_name: factory.resource_group_name.clone(),
            factory_name: factory.factory_name.clone(),
            linked_service_name: linked_service_name.into(),
        }
    }

    /// The factory this linked service belongs to
    pub fn factory_id(&self) -> FactoryId {
        FactoryId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.factory_name,
        )
    }
}

impl fmt::Display for LinkedServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/linkedservices/{}", self.factory_id(), self.linked_service_name)
    }
}

impl ResourceIdentifier for LinkedServiceId {
    fn parse(input: &str) -> ProviderResult<Self> {
        let v = parse_segments(input, Self::TEMPLATE, Self::EXAMPLE)?;
        Ok(Self::new(&FactoryId::new(&v[0], &v[1], &v[2]), &v[3]))
    }
}

/// Impact connector: `/subscriptions/{sub}/providers/Microsoft.Impact/connectors/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorId {
    pub subscription_id: String,
    pub connector_name: String,
}

impl ConnectorId {
    const TEMPLATE: &[&str] = &[
        "subscriptions",
        VALUE,
        "providers",
        "Microsoft.Impact",
        "connectors",
        VALUE,
    ];
    const EXAMPLE: &str = "/subscriptions/12345678-1234-9876-4563-123456789012/providers/Microsoft.Impact/connectors/connectorName";

    pub fn new(subscription_id: impl Into<String>, connector_name: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            connector_name: connector_name.into(),
        }
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/providers/Microsoft.Impact/connectors/{}",
            self.subscription_id, self.connector_name
        )
    }
}

impl ResourceIdentifier for ConnectorId {
    fn parse(input: &str) -> ProviderResult<Self> {
        let v = parse_segments(input, Self::TEMPLATE, Self::EXAMPLE)?;
        Ok(Self::new(&v[0], &v[1]))
    }
}
