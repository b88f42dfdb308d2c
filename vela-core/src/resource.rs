//! Resource - Representing configuration documents and their state

use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "azurerm_impact_connectors")
    pub resource_type: String,
    /// Resource name (the key the user gave the resource in the configuration file)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    /// Integer above `i64::MAX`
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Convert a JSON value into an attribute value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert this attribute value into JSON
    ///
    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::UInt(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Null => serde_json::Value::Null,
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Returns the string slice if this is a `Value::String`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value carries no information (null, empty list, empty map)
    ///
    /// Absent attributes and empty collections are interchangeable in a configuration.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }
}

/// Desired state declared in a configuration document
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Current state fetched from the remote API
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Remote resource identifier (e.g., an ARM resource ID)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// Typed, read-only view over configuration attributes
///
/// Used by resource types to decode a validated configuration document into
/// their model. Lookups of absent attributes yield empty values.
pub struct Attributes<'a> {
    attributes: &'a HashMap<String, Value>,
}

impl<'a> Attributes<'a> {
    pub fn new(attributes: &'a HashMap<String, Value>) -> Self {
        Self { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.attributes.get(key)
    }

    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> Option<&'a str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Get a string attribute, or an empty string when unset
    pub fn string_or_default(&self, key: &str) -> String {
        self.get_string(key).unwrap_or_default().to_string()
    }

    /// Get a list of strings, skipping non-string items
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.attributes.get(key) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Get a map of strings, skipping non-string values
    pub fn string_map(&self, key: &str) -> std::collections::BTreeMap<String, String> {
        match self.attributes.get(key) {
            Some(Value::Map(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => Default::default(),
        }
    }

    /// Get a list of nested blocks
    pub fn blocks(&self, key: &str) -> Vec<Attributes<'a>> {
        match self.attributes.get(key) {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Map(map) => Some(Attributes::new(map)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
