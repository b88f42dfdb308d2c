//! Linked service property mapping
//!
//! The configuration schema of a custom linked service is flat, while the
//! Data Factory API nests it under `properties` with a few fixed keys
//! (`type`, `typeProperties`, `connectVia`, `parameters`, ...) and accepts
//! arbitrary extra keys. [`expand`] turns the flat form into the nested one
//! and [`flatten`] goes back, collecting every key it does not recognise into
//! `additional_properties`.
//!
//! Both directions are pure functions of their input.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue, json};
use vela_core::schema::TypeError;

/// Flat, property-derived half of a linked custom service configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceProperties {
    pub service_type: String,
    /// Compact JSON text with sorted keys
    pub type_properties_json: String,
    pub description: Option<String>,
    pub integration_runtime: Option<IntegrationRuntime>,
    pub parameters: BTreeMap<String, String>,
    pub annotations: Vec<String>,
    pub additional_properties: BTreeMap<String, JsonValue>,
}

/// Reference to the integration runtime the service connects through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationRuntime {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

pub const TYPE: &str = "type";
pub const TYPE_PROPERTIES: &str = "typeProperties";
pub const DESCRIPTION: &str = "description";
pub const CONNECT_VIA: &str = "connectVia";
pub const PARAMETERS: &str = "parameters";
pub const ANNOTATIONS: &str = "annotations";

const INTEGRATION_RUNTIME_REFERENCE: &str = "IntegrationRuntimeReference";

/// Parse a JSON document and render it compactly with sorted keys
///
/// Two documents that differ only in whitespace or key order normalize to
/// the same text.
pub fn normalize_json(input: &str) -> Result<String, TypeError> {
    let parsed = parse_json(input)?;
    Ok(parsed.to_string())
}

fn parse_json(input: &str) -> Result<JsonValue, TypeError> {
    serde_json::from_str(input).map_err(|e| {
        TypeError::InvalidJson {
            message: e.to_string(),
        }
        .for_attribute("type_properties_json")
    })
}

/// Flat configuration → remote `properties` object
///
/// Fails only when `type_properties_json` is not valid JSON.
pub fn expand(config: &ServiceProperties) -> Result<Map<String, JsonValue>, TypeError> {
    let mut props = Map::new();
    props.insert(TYPE.to_string(), json!(config.service_type));
    if let Some(connect_via) = expand_connect_via(config.integration_runtime.as_ref()) {
        props.insert(CONNECT_VIA.to_string(), connect_via);
    }

    props.insert(
        TYPE_PROPERTIES.to_string(),
        parse_json(&config.type_properties_json)?,
    );

    if let Some(description) = expand_description(config.description.as_deref()) {
        props.insert(DESCRIPTION.to_string(), description);
    }
    if let Some(parameters) = expand_parameters(&config.parameters) {
        props.insert(PARAMETERS.to_string(), parameters);
    }
    if let Some(annotations) = expand_annotations(&config.annotations) {
        props.insert(ANNOTATIONS.to_string(), annotations);
    }

    // Extra keys win over everything above
    for (key, value) in &config.additional_properties {
        props.insert(key.clone(), value.clone());
    }

    Ok(props)
}

/// Remote `properties` object → flat configuration
///
/// Known keys are matched regardless of case. Anything left over after the
/// known keys are taken out ends up in `additional_properties`.
pub fn flatten(mut props: Map<String, JsonValue>) -> ServiceProperties {
    let description = take(&mut props, DESCRIPTION)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty());
    let service_type = take(&mut props, TYPE)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let annotations = match take(&mut props, ANNOTATIONS) {
        Some(JsonValue::Array(items)) => items.iter().map(json_text).collect(),
        _ => Vec::new(),
    };
    let parameters = match take(&mut props, PARAMETERS) {
        Some(JsonValue::Object(specs)) => specs
            .iter()
            .map(|(name, spec)| {
                let default = spec
                    .get("defaultValue")
                    .filter(|v| !v.is_null())
                    .map(json_text)
                    .unwrap_or_default();
                (name.clone(), default)
            })
            .collect(),
        _ => BTreeMap::new(),
    };
    let integration_runtime = take(&mut props, CONNECT_VIA).and_then(flatten_connect_via);
    let type_properties_json = take(&mut props, TYPE_PROPERTIES)
        .map(|v| v.to_string())
        .unwrap_or_default();

    ServiceProperties {
        service_type,
        type_properties_json,
        description,
        integration_runtime,
        parameters,
        annotations,
        additional_properties: props.into_iter().collect(),
    }
}

pub fn expand_description(description: Option<&str>) -> Option<JsonValue> {
    description.filter(|d| !d.is_empty()).map(|d| json!(d))
}

/// Every parameter becomes a String parameter specification
pub fn expand_parameters(parameters: &BTreeMap<String, String>) -> Option<JsonValue> {
    if parameters.is_empty() {
        return None;
    }
    let specs: Map<String, JsonValue> = parameters
        .iter()
        .map(|(name, default)| {
            (
                name.clone(),
                json!({ "type": "String", "defaultValue": default }),
            )
        })
        .collect();
    Some(JsonValue::Object(specs))
}

pub fn expand_annotations(annotations: &[String]) -> Option<JsonValue> {
    if annotations.is_empty() {
        None
    } else {
        Some(json!(annotations))
    }
}

pub fn expand_connect_via(runtime: Option<&IntegrationRuntime>) -> Option<JsonValue> {
    let runtime = runtime?;
    let mut reference = json!({
        "referenceName": runtime.name,
        "type": INTEGRATION_RUNTIME_REFERENCE,
    });
    if !runtime.parameters.is_empty() {
        reference["parameters"] = json!(runtime.parameters);
    }
    Some(reference)
}

fn flatten_connect_via(value: JsonValue) -> Option<IntegrationRuntime> {
    let JsonValue::Object(mut reference) = value else {
        return None;
    };
    let name = take(&mut reference, "referenceName")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let parameters = match take(&mut reference, PARAMETERS) {
        Some(JsonValue::Object(params)) => params
            .iter()
            .map(|(k, v)| (k.clone(), json_text(v)))
            .collect(),
        _ => BTreeMap::new(),
    };
    Some(IntegrationRuntime { name, parameters })
}

/// Remove a key, matching its name case-insensitively
pub fn take(props: &mut Map<String, JsonValue>, key: &str) -> Option<JsonValue> {
    let actual = props.keys().find(|k| k.eq_ignore_ascii_case(key))?.clone();
    props.remove(&actual)
}

/// Set a key, or drop it when `value` is `None`
///
/// Any differently-cased spelling of the key already present is replaced.
pub fn replace(props: &mut Map<String, JsonValue>, key: &str, value: Option<JsonValue>) {
    take(props, key);
    if let Some(value) = value {
        props.insert(key.to_string(), value);
    }
}

/// Strings as-is, everything else as JSON text
fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_storage() -> ServiceProperties {
        ServiceProperties {
            service_type: "AzureBlobStorage".to_string(),
            type_properties_json: "{}".to_string(),
            parameters: BTreeMap::from([("a".to_string(), "1".to_string())]),
            ..Default::default()
        }
    }

    fn full() -> ServiceProperties {
        ServiceProperties {
            service_type: "AzureBlobStorage".to_string(),
            type_properties_json: r#"{"connectionString":"DefaultEndpointsProtocol=https","nested":{"a":1}}"#
                .to_string(),
            description: Some("test description".to_string()),
            integration_runtime: Some(IntegrationRuntime {
                name: "ir-1".to_string(),
                parameters: BTreeMap::from([("Key".to_string(), "value".to_string())]),
            }),
            parameters: BTreeMap::from([
                ("foo".to_string(), "test1".to_string()),
                ("bar".to_string(), "test2".to_string()),
            ]),
            annotations: vec!["z".to_string(), "a".to_string()],
            additional_properties: BTreeMap::from([
                ("foo".to_string(), json!("test1")),
                ("retries".to_string(), json!(3)),
                ("enabled".to_string(), json!(false)),
                ("settings".to_string(), json!({"mode": "fast", "tiers": [1, 2]})),
            ]),
        }
    }

    #[test]
    fn expand_blob_storage() {
        let props = expand(&blob_storage()).unwrap();

        assert_eq!(props["type"], "AzureBlobStorage");
        assert_eq!(
            props["parameters"],
            json!({"a": {"type": "String", "defaultValue": "1"}})
        );
        assert_eq!(props["typeProperties"], json!({}));
        assert!(!props.contains_key("description"));
        assert!(!props.contains_key("annotations"));
        assert!(!props.contains_key("connectVia"));
    }

    #[test]
    fn expand_connect_via_reference() {
        let props = expand(&full()).unwrap();
        assert_eq!(
            props["connectVia"],
            json!({
                "referenceName": "ir-1",
                "type": "IntegrationRuntimeReference",
                "parameters": {"Key": "value"}
            })
        );
        assert_eq!(props["annotations"], json!(["z", "a"]));
        assert_eq!(props["description"], "test description");
    }

    #[test]
    fn expand_rejects_invalid_type_properties() {
        let config = ServiceProperties {
            type_properties_json: "{not json".to_string(),
            ..blob_storage()
        };
        let err = expand(&config).unwrap_err();
        assert_eq!(err.attribute(), Some("type_properties_json"));
    }

    #[test]
    fn additional_properties_overwrite_fixed_keys() {
        let mut config = blob_storage();
        config
            .additional_properties
            .insert("type".to_string(), json!("Overridden"));
        let props = expand(&config).unwrap();
        assert_eq!(props["type"], "Overridden");
    }

    #[test]
    fn flatten_of_expand_is_identity() {
        let config = full();
        assert_eq!(flatten(expand(&config).unwrap()), config);
        assert_eq!(flatten(expand(&blob_storage()).unwrap()), blob_storage());
    }

    #[test]
    fn expand_of_flatten_reproduces_every_key() {
        let remote = json!({
            "type": "CustomDataSource",
            "description": "remote",
            "typeProperties": {"url": "https://example.com", "auth": {"kind": "none"}},
            "parameters": {"p": {"type": "String", "defaultValue": "v"}},
            "annotations": ["one"],
            "connectVia": {"referenceName": "ir", "type": "IntegrationRuntimeReference"},
            "version": "1.0",
            "timeoutSeconds": 30
        });
        let JsonValue::Object(props) = remote.clone() else {
            unreachable!()
        };

        let expanded = expand(&flatten(props)).unwrap();
        assert_eq!(JsonValue::Object(expanded), remote);
    }

    #[test]
    fn flatten_matches_keys_case_insensitively() {
        let JsonValue::Object(props) = json!({
            "Type": "AzureBlobStorage",
            "Description": "upper",
            "TypeProperties": {"b": 1, "a": 2},
            "ConnectVia": {"ReferenceName": "ir"},
            "Extra": "kept"
        }) else {
            unreachable!()
        };

        let flat = flatten(props);
        assert_eq!(flat.service_type, "AzureBlobStorage");
        assert_eq!(flat.description.as_deref(), Some("upper"));
        assert_eq!(flat.type_properties_json, r#"{"a":2,"b":1}"#);
        assert_eq!(flat.integration_runtime.unwrap().name, "ir");
        assert_eq!(
            flat.additional_properties,
            BTreeMap::from([("Extra".to_string(), json!("kept"))])
        );
    }

    #[test]
    fn flatten_renders_non_string_defaults_as_json() {
        let JsonValue::Object(props) = json!({
            "type": "X",
            "parameters": {
                "count": {"type": "Int", "defaultValue": 5},
                "flags": {"type": "Array", "defaultValue": ["a"]},
                "unset": {"type": "String"}
            }
        }) else {
            unreachable!()
        };

        let flat = flatten(props);
        assert_eq!(flat.parameters["count"], "5");
        assert_eq!(flat.parameters["flags"], r#"["a"]"#);
        assert_eq!(flat.parameters["unset"], "");
    }

    #[test]
    fn normalize_json_ignores_formatting() {
        let a = normalize_json("{ \"b\": [1, 2],\n \"a\": {\"y\": 1, \"x\": 2} }").unwrap();
        let b = normalize_json(r#"{"a":{"x":2,"y":1},"b":[1,2]}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":{"x":2,"y":1},"b":[1,2]}"#);
    }

    #[test]
    fn replace_swaps_differently_cased_key() {
        let JsonValue::Object(mut props) = json!({"Description": "old"}) else {
            unreachable!()
        };
        replace(&mut props, DESCRIPTION, Some(json!("new")));
        assert_eq!(JsonValue::Object(props.clone()), json!({"description": "new"}));
        replace(&mut props, DESCRIPTION, None);
        assert!(props.is_empty());
    }
}
