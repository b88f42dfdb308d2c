//! Attribute validators for Azure resource types
//!
//! Each validator has the `fn(&Value) -> Result<(), String>` shape expected by
//! [`AttributeType::Custom`], so it runs during schema validation alongside
//! every other check.

use std::sync::LazyLock;

use regex::Regex;
use vela_core::lifecycle::ResourceIdentifier;
use vela_core::resource::Value;
use vela_core::schema::AttributeType;

use crate::ids::FactoryId;

static LINKED_SERVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][^.+?/<>*%&:\\]*$").expect("valid regex"));

static CONNECTOR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]{3,24}$").expect("valid regex"));

/// Platforms an Impact connector can be attached to
pub const PLATFORM_VALUES: &[&str] = &["AzureMonitor"];

fn check_string(value: &Value, check: impl FnOnce(&str) -> Result<(), String>) -> Result<(), String> {
    match value {
        Value::String(s) => check(s),
        // type mismatches are reported by the base type
        _ => Ok(()),
    }
}

/// Data Factory linked service name
pub fn linked_service_name(value: &Value) -> Result<(), String> {
    check_string(value, |s| {
        if LINKED_SERVICE_NAME.is_match(s) {
            Ok(())
        } else {
            Err(format!(
                "invalid name {:?}: must start with a letter, number or underscore and cannot contain any of . + ? / < > * % & : \\",
                s
            ))
        }
    })
}

/// Impact connector name
pub fn connector_name(value: &Value) -> Result<(), String> {
    check_string(value, |s| {
        if CONNECTOR_NAME.is_match(s) {
            Ok(())
        } else {
            Err(format!(
                "invalid name {:?}: must be between 3 and 24 alphanumeric characters or hyphens",
                s
            ))
        }
    })
}

/// Impact connector platform
pub fn connector_type(value: &Value) -> Result<(), String> {
    check_string(value, |s| {
        if PLATFORM_VALUES.contains(&s) {
            Ok(())
        } else {
            Err(format!(
                "invalid value {:?}, must be one of: {}",
                s,
                PLATFORM_VALUES.join(", ")
            ))
        }
    })
}

/// Data Factory resource ID
pub fn factory_id(value: &Value) -> Result<(), String> {
    check_string(value, |s| {
        FactoryId::parse(s).map(|_| ()).map_err(|e| e.to_string())
    })
}

/// Wrap a validator into a string-based attribute type
pub fn custom_string(name: &str, validate: fn(&Value) -> Result<(), String>) -> AttributeType {
    AttributeType::Custom {
        name: name.to_string(),
        base: Box::new(AttributeType::String),
        validate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn linked_service_names() {
        for valid in ["svc", "_private", "9lives", "with space", "a-b_c"] {
            assert!(linked_service_name(&s(valid)).is_ok(), "{} should be valid", valid);
        }
        for invalid in ["", "-lead", "a.b", "a+b", "a?b", "a/b", "a<b", "a*b", "a%b", "a&b", "a:b", "a\\b"] {
            assert!(linked_service_name(&s(invalid)).is_err(), "{} should be invalid", invalid);
        }
    }

    #[test]
    fn connector_names() {
        assert!(connector_name(&s("abc")).is_ok());
        assert!(connector_name(&s("connector-01")).is_ok());
        assert!(connector_name(&s("ab")).is_err());
        assert!(connector_name(&s("a".repeat(25).as_str())).is_err());
        assert!(connector_name(&s("under_score")).is_err());
    }

    #[test]
    fn connector_types() {
        assert!(connector_type(&s("AzureMonitor")).is_ok());
        let err = connector_type(&s("azuremonitor")).unwrap_err();
        assert!(err.contains("AzureMonitor"));
    }

    #[test]
    fn factory_ids() {
        let id = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DataFactory/factories/df";
        assert!(factory_id(&s(id)).is_ok());
        assert!(factory_id(&s("/subscriptions/x/resourceGroups/rg")).is_err());
    }

    #[test]
    fn non_strings_are_left_to_the_base_type() {
        assert!(connector_type(&Value::Int(1)).is_ok());
        let t = custom_string("ConnectorType", connector_type);
        assert!(t.validate(&Value::Int(1)).is_err());
    }
}
