//! Schema - Define type schemas for resources
//!
//! Resource types declare a schema for their configuration document, and
//! every document is validated once at decode time. Validation reports every
//! violation at once rather than stopping at the first.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Any JSON-representable value, passed through untouched
    Any,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attributes
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::Any, _) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_) | Value::UInt(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|message| TypeError::ValidationFailed { message })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for k in keys {
                    inner.validate(&map[k]).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(attributes), Value::Map(map)) => {
                match validate_attributes(attributes.iter(), map).into_iter().next() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Any => "Any".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' allows at most {max} item(s), got {got}")]
    TooManyItems { name: String, max: usize, got: usize },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    Attribute { name: String, inner: Box<TypeError> },
}

impl TypeError {
    /// Attach the attribute name to an error
    pub fn for_attribute(self, name: impl Into<String>) -> Self {
        TypeError::Attribute {
            name: name.into(),
            inner: Box::new(self),
        }
    }

    /// Name of the top-level attribute this error concerns, if any
    pub fn attribute(&self) -> Option<&str> {
        match self {
            TypeError::Attribute { name, .. }
            | TypeError::MissingRequired { name }
            | TypeError::UnknownAttribute { name }
            | TypeError::TooManyItems { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) | Value::UInt(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Null => "Null".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Changing this attribute replaces the remote resource
    pub force_new: bool,
    /// Upper bound on list length (e.g., single nested blocks)
    pub max_items: Option<usize>,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            force_new: false,
            max_items: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    fn validate(&self, value: &Value) -> Result<(), TypeError> {
        if let (Some(max), Value::List(items)) = (self.max_items, value)
            && items.len() > max
        {
            return Err(TypeError::TooManyItems {
                name: self.name.clone(),
                max,
                got: items.len(),
            });
        }
        self.attr_type
            .validate(value)
            .map_err(|e| e.for_attribute(&self.name))
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Names of attributes whose change forces replacement
    pub fn force_new_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .values()
            .filter(|a| a.force_new)
            .map(|a| a.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Validate resource attributes, collecting every violation
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let errors = validate_attributes(self.attributes.values(), attributes);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validate a set of attributes against their schemas
///
/// Errors come back ordered by attribute name so reports are stable.
fn validate_attributes<'a>(
    schemas: impl Iterator<Item = &'a AttributeSchema>,
    attributes: &HashMap<String, Value>,
) -> Vec<TypeError> {
    let schemas: HashMap<&str, &AttributeSchema> = schemas.map(|s| (s.name.as_str(), s)).collect();
    let mut errors = Vec::new();

    for (name, schema) in &schemas {
        let missing = attributes.get(*name).is_none_or(Value::is_empty);
        if schema.required && missing {
            errors.push(TypeError::MissingRequired {
                name: name.to_string(),
            });
        }
    }

    for (name, value) in attributes {
        match schemas.get(name.as_str()) {
            // Null stands for "unset"
            Some(_) if matches!(value, Value::Null) => {}
            Some(schema) => {
                if let Err(e) = schema.validate(value) {
                    errors.push(e);
                }
            }
            None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
        }
    }

    errors.sort_by(|a, b| a.attribute().cmp(&b.attribute()));
    errors
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// String that must not be empty
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.is_empty() => Err("must not be empty".to_string()),
                _ => Ok(()),
            },
        }
    }

    /// String holding a JSON document
    pub fn json_string() -> AttributeType {
        AttributeType::Custom {
            name: "JsonString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                    .map(|_| ())
                    .map_err(|e| format!("invalid JSON: {}", e)),
                _ => Ok(()),
            },
        }
    }

    /// Map of strings
    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    /// List of strings
    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }
}
