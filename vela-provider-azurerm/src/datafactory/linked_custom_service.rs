//! azurerm_data_factory_linked_custom_service
//!
//! A linked service of arbitrary type inside a Data Factory. The type-specific
//! settings travel as an opaque JSON document (`type_properties_json`), and
//! remote keys the schema does not model round-trip through
//! `additional_properties`.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value as JsonValue};
use vela_core::differ::ChangeSet;
use vela_core::lifecycle::{Account, ManagedResource, ResourceIdentifier};
use vela_core::provider::ProviderResult;
use vela_core::resource::{Attributes, Value};
use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, TypeError, types};

use super::mapper::{self, IntegrationRuntime, ServiceProperties};
use crate::ids::{FactoryId, LinkedServiceId};
use crate::models::ResourceEnvelope;
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_data_factory_linked_custom_service";
const API_VERSION: &str = "2018-06-01";

/// Typed configuration of a linked custom service
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedCustomServiceModel {
    pub name: String,
    pub data_factory_id: String,
    pub properties: ServiceProperties,
}

pub type LinkedServiceResource = ResourceEnvelope<Map<String, JsonValue>>;

pub struct LinkedCustomService;

impl ManagedResource for LinkedCustomService {
    type Model = LinkedCustomServiceModel;
    type Id = LinkedServiceId;
    type Remote = LinkedServiceResource;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn schema(&self) -> ResourceSchema {
        let integration_runtime = AttributeType::Block(vec![
            AttributeSchema::new("name", types::non_empty_string()).required(),
            AttributeSchema::new("parameters", types::string_map()),
        ]);

        ResourceSchema::new(RESOURCE_TYPE)
            .with_description("Manages a Linked Service (connection) between a resource and Azure Data Factory.")
            .attribute(
                AttributeSchema::new(
                    "name",
                    validate::custom_string("LinkedServiceName", validate::linked_service_name),
                )
                .required()
                .force_new(),
            )
            .attribute(
                AttributeSchema::new(
                    "data_factory_id",
                    validate::custom_string("FactoryId", validate::factory_id),
                )
                .required()
                .force_new(),
            )
            .attribute(
                AttributeSchema::new("type", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("type_properties_json", types::json_string())
                    .required()
                    .with_description("JSON document holding the type-specific settings"),
            )
            .attribute(AttributeSchema::new("description", types::non_empty_string()))
            .attribute(
                AttributeSchema::new(
                    "integration_runtime",
                    AttributeType::List(Box::new(integration_runtime)),
                )
                .with_max_items(1),
            )
            .attribute(AttributeSchema::new("parameters", types::string_map()))
            .attribute(AttributeSchema::new("annotations", types::string_list()))
            .attribute(
                AttributeSchema::new(
                    "additional_properties",
                    AttributeType::Map(Box::new(AttributeType::Any)),
                )
                .with_description("Extra properties sent verbatim to the API"),
            )
    }

    fn decode(&self, attributes: &Attributes<'_>) -> Result<LinkedCustomServiceModel, Vec<TypeError>> {
        let type_properties_json = mapper::normalize_json(
            attributes.get_string("type_properties_json").unwrap_or("{}"),
        )
        .map_err(|e| vec![e])?;

        let integration_runtime = attributes
            .blocks("integration_runtime")
            .first()
            .map(|block| IntegrationRuntime {
                name: block.string_or_default("name"),
                parameters: block.string_map("parameters"),
            });

        let additional_properties: BTreeMap<String, JsonValue> =
            match attributes.get("additional_properties") {
                Some(Value::Map(map)) => map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
                _ => BTreeMap::new(),
            };

        Ok(LinkedCustomServiceModel {
            name: attributes.string_or_default("name"),
            data_factory_id: attributes.string_or_default("data_factory_id"),
            properties: ServiceProperties {
                service_type: attributes.string_or_default("type"),
                type_properties_json,
                description: attributes.get_string("description").map(str::to_string),
                integration_runtime,
                parameters: attributes.string_map("parameters"),
                annotations: attributes.string_list("annotations"),
                additional_properties,
            },
        })
    }

    fn encode(&self, model: &LinkedCustomServiceModel) -> HashMap<String, Value> {
        let props = &model.properties;
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String(model.name.clone()));
        attrs.insert(
            "data_factory_id".to_string(),
            Value::String(model.data_factory_id.clone()),
        );
        attrs.insert("type".to_string(), Value::String(props.service_type.clone()));
        attrs.insert(
            "type_properties_json".to_string(),
            Value::String(props.type_properties_json.clone()),
        );

        if let Some(description) = &props.description {
            attrs.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(runtime) = &props.integration_runtime {
            let mut block = HashMap::new();
            block.insert("name".to_string(), Value::String(runtime.name.clone()));
            if !runtime.parameters.is_empty() {
                block.insert("parameters".to_string(), string_map(&runtime.parameters));
            }
            attrs.insert(
                "integration_runtime".to_string(),
                Value::List(vec![Value::Map(block)]),
            );
        }
        if !props.parameters.is_empty() {
            attrs.insert("parameters".to_string(), string_map(&props.parameters));
        }
        if !props.annotations.is_empty() {
            attrs.insert(
                "annotations".to_string(),
                Value::List(
                    props
                        .annotations
                        .iter()
                        .map(|a| Value::String(a.clone()))
                        .collect(),
                ),
            );
        }
        if !props.additional_properties.is_empty() {
            attrs.insert(
                "additional_properties".to_string(),
                Value::Map(
                    props
                        .additional_properties
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                ),
            );
        }
        attrs
    }

    fn resource_id(&self, _account: &Account, model: &LinkedCustomServiceModel) -> ProviderResult<LinkedServiceId> {
        let factory = FactoryId::parse(&model.data_factory_id)?;
        Ok(LinkedServiceId::new(&factory, &model.name))
    }

    fn expand(&self, model: &LinkedCustomServiceModel) -> Result<LinkedServiceResource, TypeError> {
        Ok(ResourceEnvelope::with_properties(mapper::expand(
            &model.properties,
        )?))
    }

    fn flatten(&self, id: &LinkedServiceId, remote: LinkedServiceResource) -> Result<LinkedCustomServiceModel, String> {
        let properties = remote
            .properties
            .ok_or_else(|| "`properties` was nil".to_string())?;
        Ok(LinkedCustomServiceModel {
            name: id.linked_service_name.clone(),
            data_factory_id: id.factory_id().to_string(),
            properties: mapper::flatten(properties),
        })
    }

    fn apply_changes(
        &self,
        existing: &mut LinkedServiceResource,
        model: &LinkedCustomServiceModel,
        changes: &ChangeSet,
    ) -> Result<(), TypeError> {
        let config = &model.properties;
        let props = existing
            .properties_mut()
            .map_err(|message| TypeError::ValidationFailed { message })?;

        if changes.has_change("type_properties_json") {
            let expanded = mapper::expand(config)?;
            mapper::replace(
                props,
                mapper::TYPE_PROPERTIES,
                expanded.get(mapper::TYPE_PROPERTIES).cloned(),
            );
        }
        if changes.has_change("description") {
            mapper::replace(
                props,
                mapper::DESCRIPTION,
                mapper::expand_description(config.description.as_deref()),
            );
        }
        if changes.has_change("integration_runtime") {
            mapper::replace(
                props,
                mapper::CONNECT_VIA,
                mapper::expand_connect_via(config.integration_runtime.as_ref()),
            );
        }
        if changes.has_change("parameters") {
            mapper::replace(
                props,
                mapper::PARAMETERS,
                mapper::expand_parameters(&config.parameters),
            );
        }
        if changes.has_change("annotations") {
            mapper::replace(
                props,
                mapper::ANNOTATIONS,
                mapper::expand_annotations(&config.annotations),
            );
        }
        if changes.has_change("additional_properties") {
            // Keys the configuration dropped are removed remotely too
            if let Some(Value::Map(prior)) = changes.prior("additional_properties") {
                for key in prior.keys() {
                    if !config.additional_properties.contains_key(key) {
                        props.remove(key);
                    }
                }
            }
            for (key, value) in &config.additional_properties {
                props.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Map(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
