//! azurerm_impact_connectors
//!
//! Subscription-scoped connector that forwards Azure Monitor alerts to
//! Impact Reporting.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use vela_core::differ::ChangeSet;
use vela_core::lifecycle::{Account, ManagedResource, Timeouts};
use vela_core::provider::ProviderResult;
use vela_core::resource::{Attributes, Value};
use vela_core::schema::{AttributeSchema, ResourceSchema, TypeError};

use crate::ids::ConnectorId;
use crate::models::ResourceEnvelope;
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_impact_connectors";
const API_VERSION: &str = "2024-05-01-preview";

/// Connector properties as the Impact API reports them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,
    #[serde(default)]
    pub connector_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time_stamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Fields this provider does not model, sent back untouched
    #[serde(flatten)]
    pub other: Map<String, JsonValue>,
}

pub type Connector = ResourceEnvelope<ConnectorProperties>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorModel {
    pub name: String,
    pub connector_type: String,
}

pub struct ImpactConnector;

impl ManagedResource for ImpactConnector {
    type Model = ConnectorModel;
    type Id = ConnectorId;
    type Remote = Connector;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn api_version(&self) -> &'static str {
        API_VERSION
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(RESOURCE_TYPE)
            .with_description("Manages an Azure Impact Connector.")
            .attribute(
                AttributeSchema::new(
                    "name",
                    validate::custom_string("ConnectorName", validate::connector_name),
                )
                .required()
                .force_new(),
            )
            .attribute(
                AttributeSchema::new(
                    "connector_type",
                    validate::custom_string("ConnectorType", validate::connector_type),
                )
                .required(),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            read: Duration::from_secs(30 * 60),
            ..Timeouts::default()
        }
    }

    fn decode(&self, attributes: &Attributes<'_>) -> Result<ConnectorModel, Vec<TypeError>> {
        Ok(ConnectorModel {
            name: attributes.string_or_default("name"),
            connector_type: attributes.string_or_default("connector_type"),
        })
    }

    fn encode(&self, model: &ConnectorModel) -> HashMap<String, Value> {
        HashMap::from([
            ("name".to_string(), Value::String(model.name.clone())),
            (
                "connector_type".to_string(),
                Value::String(model.connector_type.clone()),
            ),
        ])
    }

    fn resource_id(&self, account: &Account, model: &ConnectorModel) -> ProviderResult<ConnectorId> {
        Ok(ConnectorId::new(&account.subscription_id, &model.name))
    }

    fn expand(&self, model: &ConnectorModel) -> Result<Connector, TypeError> {
        Ok(ResourceEnvelope::with_properties(ConnectorProperties {
            connector_type: model.connector_type.clone(),
            // The API rejects a create without a timestamp; the value is ignored
            last_run_time_stamp: Some(
                DateTime::<Utc>::UNIX_EPOCH.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ..Default::default()
        }))
    }

    fn flatten(&self, id: &ConnectorId, remote: Connector) -> Result<ConnectorModel, String> {
        let properties = remote
            .properties
            .ok_or_else(|| "`properties` was nil".to_string())?;
        Ok(ConnectorModel {
            name: id.connector_name.clone(),
            connector_type: properties.connector_type,
        })
    }

    fn apply_changes(
        &self,
        existing: &mut Connector,
        model: &ConnectorModel,
        changes: &ChangeSet,
    ) -> Result<(), TypeError> {
        let properties = existing
            .properties_mut()
            .map_err(|message| TypeError::ValidationFailed { message })?;
        if changes.has_change("connector_type") {
            properties.connector_type = model.connector_type.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vela_core::client::MemoryClient;
    use vela_core::lifecycle::{Lifecycle, ProviderContext};
    use vela_core::provider::ProviderError;
    use vela_core::resource::{Resource, ResourceId, State};

    use super::*;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const CONNECTOR_ID: &str =
        "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Impact/connectors/acctest-01";

    fn config(name: &str, connector_type: &str) -> Resource {
        Resource::new(RESOURCE_TYPE, "test")
            .with_attribute("name", Value::String(name.to_string()))
            .with_attribute("connector_type", Value::String(connector_type.to_string()))
    }

    fn context(client: &Arc<MemoryClient>) -> ProviderContext {
        ProviderContext::new(client.clone(), Account::new(SUB))
    }

    #[tokio::test]
    async fn create_sends_epoch_timestamp() {
        let client = Arc::new(MemoryClient::new());
        let lifecycle = Lifecycle::new(ImpactConnector);

        let state = lifecycle
            .create(&context(&client), &config("acctest-01", "AzureMonitor"))
            .await
            .unwrap();

        assert_eq!(state.identifier.as_deref(), Some(CONNECTOR_ID));
        assert_eq!(
            client.resource(CONNECTOR_ID).unwrap()["properties"],
            json!({
                "connectorType": "AzureMonitor",
                "lastRunTimeStamp": "1970-01-01T00:00:00Z"
            })
        );
    }

    #[tokio::test]
    async fn create_rejects_invalid_configuration() {
        let client = Arc::new(MemoryClient::new());
        let lifecycle = Lifecycle::new(ImpactConnector);

        let err = lifecycle
            .create(&context(&client), &config("x", "Splunk"))
            .await
            .unwrap_err();
        match err {
            ProviderError::Decode { errors, .. } => {
                let names: Vec<_> = errors.iter().filter_map(TypeError::attribute).collect();
                assert_eq!(names, vec!["connector_type", "name"]);
            }
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn requires_import() {
        let client = Arc::new(MemoryClient::new());
        client.insert(
            CONNECTOR_ID,
            json!({"properties": {"connectorType": "AzureMonitor"}}),
        );
        let lifecycle = Lifecycle::new(ImpactConnector);

        let err = lifecycle
            .create(&context(&client), &config("acctest-01", "AzureMonitor"))
            .await
            .unwrap_err();
        assert!(err.is_import_required());
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn read_uses_name_from_identifier() {
        let client = Arc::new(MemoryClient::new());
        client.insert(
            CONNECTOR_ID,
            json!({
                "name": "acctest-01",
                "properties": {
                    "connectorId": "abc",
                    "connectorType": "AzureMonitor",
                    "provisioningState": "Succeeded",
                    "tenantId": "t"
                }
            }),
        );
        let lifecycle = Lifecycle::new(ImpactConnector);

        let state = lifecycle
            .read(&context(&client), &ResourceId::new(RESOURCE_TYPE, "test"), CONNECTOR_ID)
            .await
            .unwrap();
        assert_eq!(state.attributes, config("acctest-01", "AzureMonitor").attributes);
    }

    #[tokio::test]
    async fn read_without_properties_is_malformed() {
        let client = Arc::new(MemoryClient::new());
        client.insert(CONNECTOR_ID, json!({"name": "acctest-01"}));
        let lifecycle = Lifecycle::new(ImpactConnector);

        let err = lifecycle
            .read(&context(&client), &ResourceId::new(RESOURCE_TYPE, "test"), CONNECTOR_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn update_keeps_server_fields() {
        let client = Arc::new(MemoryClient::new());
        client.insert(
            CONNECTOR_ID,
            json!({
                "properties": {
                    "connectorType": "Legacy",
                    "tenantId": "t",
                    "lastRunTimeStamp": "2024-06-01T10:00:00Z",
                    "futureField": {"x": 1}
                }
            }),
        );
        let lifecycle = Lifecycle::new(ImpactConnector);
        let from = State::existing(
            ResourceId::new(RESOURCE_TYPE, "test"),
            config("acctest-01", "Legacy").attributes,
        );

        lifecycle
            .update(
                &context(&client),
                CONNECTOR_ID,
                &from,
                &config("acctest-01", "AzureMonitor"),
            )
            .await
            .unwrap();

        let props = &client.resource(CONNECTOR_ID).unwrap()["properties"];
        assert_eq!(props["connectorType"], "AzureMonitor");
        assert_eq!(props["tenantId"], "t");
        assert_eq!(props["lastRunTimeStamp"], "2024-06-01T10:00:00Z");
        assert_eq!(props["futureField"], json!({"x": 1}));
    }

    #[tokio::test]
    async fn delete_then_read_marks_gone() {
        let client = Arc::new(MemoryClient::new());
        let lifecycle = Lifecycle::new(ImpactConnector);
        let ctx = context(&client);
        lifecycle
            .create(&ctx, &config("acctest-01", "AzureMonitor"))
            .await
            .unwrap();

        lifecycle.delete(&ctx, CONNECTOR_ID).await.unwrap();

        let state = lifecycle
            .read(&ctx, &ResourceId::new(RESOURCE_TYPE, "test"), CONNECTOR_ID)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[test]
    fn reads_are_allowed_thirty_minutes() {
        assert_eq!(ImpactConnector.timeouts().read, Duration::from_secs(30 * 60));
    }

}
