//! HTTP client for Azure Resource Manager
//!
//! Implements [`RemoteClient`] on top of `reqwest`. Requests are authorised
//! with a bearer token and carry the resource type's `api-version`. Writes and
//! deletes that answer `201`/`202` are followed until the long-running
//! operation reaches a terminal state.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use vela_core::client::{ClientError, ClientResult, RemoteClient};

use crate::config::ProviderConfig;

const AZURE_ASYNC_OPERATION: &str = "Azure-AsyncOperation";
const MAX_POLL_ATTEMPTS: usize = 360;
/// Longest error body echoed into logs
const MAX_LOG_BODY_LENGTH: usize = 200;

/// ARM error envelope: `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Body of an `Azure-AsyncOperation` status resource
#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

/// Client for the Azure Resource Manager REST API
#[derive(Clone)]
pub struct ArmClient {
    http: Client,
    endpoint: String,
    access_token: String,
    poll_interval: Duration,
}

impl ArmClient {
    pub fn new(config: &ProviderConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("vela/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            poll_interval: config.poll_interval,
        })
    }

    fn url(&self, id: &str) -> String {
        format!("{}{}", self.endpoint, id)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Turn a non-success response into a `ClientError`
    async fn error_from(response: Response) -> ClientError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ClientError::NotFound;
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_default();
        warn!("API error: {} - {}", status, truncate(&body));

        ClientError::Api {
            status: status.as_u16(),
            code: detail.code,
            message: detail
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string()),
        }
    }

    async fn parse_body(response: Response) -> ClientResult<serde_json::Value> {
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Serialization(e.to_string()))
    }

    /// Wait for a long-running operation announced by `headers` to finish
    ///
    /// Does nothing when the response carries no polling URL.
    async fn wait_for_operation(&self, headers: &HeaderMap) -> ClientResult<()> {
        let async_operation = header(headers, AZURE_ASYNC_OPERATION);
        let location = header(headers, LOCATION.as_str());
        let mut delay = retry_after(headers).unwrap_or(self.poll_interval);

        let (url, via_status_resource) = match (async_operation, location) {
            (Some(url), _) => (url, true),
            (None, Some(url)) => (url, false),
            (None, None) => return Ok(()),
        };

        for _ in 0..MAX_POLL_ATTEMPTS {
            tokio::time::sleep(delay).await;
            debug!("polling long-running operation {}", url);

            let response = self.send(self.http.get(&url)).await?;
            let status = response.status();
            delay = retry_after(response.headers()).unwrap_or(self.poll_interval);

            if via_status_resource {
                if !status.is_success() {
                    return Err(Self::error_from(response).await);
                }
                let body = Self::parse_body(response).await?;
                let operation: OperationStatus = serde_json::from_value(body)
                    .map_err(|e| ClientError::Serialization(e.to_string()))?;
                // Status values are case-insensitive
                let state = operation.status.as_str();
                if state.eq_ignore_ascii_case("Succeeded") {
                    return Ok(());
                }
                if state.eq_ignore_ascii_case("Failed") || state.eq_ignore_ascii_case("Canceled") {
                    let message = operation
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "no error details".to_string());
                    return Err(ClientError::OperationFailed {
                        status: operation.status,
                        message,
                    });
                }
            } else {
                match status {
                    StatusCode::ACCEPTED => continue,
                    s if s.is_success() => return Ok(()),
                    _ => return Err(Self::error_from(response).await),
                }
            }
        }

        Err(ClientError::OperationFailed {
            status: "Timeout".to_string(),
            message: format!("still running after {} polls", MAX_POLL_ATTEMPTS),
        })
    }
}

#[async_trait]
impl RemoteClient for ArmClient {
    async fn get(&self, id: &str, api_version: &str) -> ClientResult<Option<serde_json::Value>> {
        debug!("GET {}", id);
        let request = self.http.get(self.url(id)).query(&[("api-version", api_version)]);
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::parse_body(response).await.map(Some),
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn create_or_update(
        &self,
        id: &str,
        api_version: &str,
        body: serde_json::Value,
    ) -> ClientResult<serde_json::Value> {
        debug!("PUT {}", id);
        let request = self
            .http
            .put(self.url(id))
            .query(&[("api-version", api_version)])
            .json(&body);
        let response = self.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }
        if status == StatusCode::CREATED || status == StatusCode::ACCEPTED {
            let headers = response.headers().clone();
            if header(&headers, AZURE_ASYNC_OPERATION).is_some()
                || header(&headers, LOCATION.as_str()).is_some()
            {
                self.wait_for_operation(&headers).await?;
                return Ok(self.get(id, api_version).await?.unwrap_or_default());
            }
        }
        Self::parse_body(response).await
    }

    async fn delete(&self, id: &str, api_version: &str) -> ClientResult<()> {
        debug!("DELETE {}", id);
        let request = self
            .http
            .delete(self.url(id))
            .query(&[("api-version", api_version)]);
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            StatusCode::ACCEPTED => self.wait_for_operation(response.headers()).await,
            s if s.is_success() => Ok(()),
            _ => Err(Self::error_from(response).await),
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `Retry-After` in seconds
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const ID: &str = "/subscriptions/s/providers/Microsoft.Impact/connectors/c1";
    const API: &str = "2024-05-01-preview";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::new(&ProviderConfig {
            subscription_id: "s".to_string(),
            tenant_id: None,
            access_token: "test-token".to_string(),
            endpoint: server.uri(),
            poll_interval: Duration::from_millis(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn get_sends_token_and_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ID))
            .and(query_param("api-version", API))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "c1"})))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server).get(ID, API).await.unwrap();
        assert_eq!(body, Some(json!({"name": "c1"})));
    }

    #[tokio::test]
    async fn get_of_missing_resource_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "ResourceNotFound", "message": "not here"}
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).get(ID, API).await.unwrap(), None);
    }

    #[tokio::test]
    async fn api_errors_carry_code_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "InvalidRequestContent", "message": "bad connectorType"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_or_update(ID, API, json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Api {
                status: 400,
                code: Some("InvalidRequestContent".to_string()),
                message: "bad connectorType".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn error_without_body_uses_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        match client(&server).get(ID, API).await.unwrap_err() {
            ClientError::Api { status, code, message } => {
                assert_eq!(status, 503);
                assert_eq!(code, None);
                assert_eq!(message, "Service Unavailable");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn put_returns_response_body() {
        let server = MockServer::start().await;
        let body = json!({"properties": {"connectorType": "AzureMonitor"}});
        Mock::given(method("PUT"))
            .and(path(ID))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": ID})))
            .expect(1)
            .mount(&server)
            .await;

        let stored = client(&server).create_or_update(ID, API, body).await.unwrap();
        assert_eq!(stored["id"], ID);
    }

    #[tokio::test]
    async fn put_follows_async_operation() {
        let server = MockServer::start().await;
        let status_url = format!("{}/operations/op1", server.uri());
        Mock::given(method("PUT"))
            .and(path(ID))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header(AZURE_ASYNC_OPERATION, status_url.as_str())
                    .insert_header("Retry-After", "0"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": ID, "etag": "1"})))
            .mount(&server)
            .await;

        let stored = client(&server)
            .create_or_update(ID, API, json!({}))
            .await
            .unwrap();
        assert_eq!(stored["etag"], "1");
    }

    #[tokio::test]
    async fn operation_status_ignores_case() {
        let server = MockServer::start().await;
        let status_url = format!("{}/operations/op3", server.uri());
        Mock::given(method("DELETE"))
            .and(path(ID))
            .respond_with(
                ResponseTemplate::new(202).insert_header(AZURE_ASYNC_OPERATION, status_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "inprogress"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "succeeded"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete(ID, API).await.unwrap();
    }

    #[tokio::test]
    async fn lowercase_failure_is_reported() {
        let server = MockServer::start().await;
        let status_url = format!("{}/operations/op4", server.uri());
        Mock::given(method("DELETE"))
            .and(path(ID))
            .respond_with(
                ResponseTemplate::new(202).insert_header(AZURE_ASYNC_OPERATION, status_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "error": {"message": "quota exceeded"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).delete(ID, API).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::OperationFailed {
                status: "failed".to_string(),
                message: "quota exceeded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn failed_operation_is_reported() {
        let server = MockServer::start().await;
        let status_url = format!("{}/operations/op2", server.uri());
        Mock::given(method("DELETE"))
            .and(path(ID))
            .respond_with(
                ResponseTemplate::new(202).insert_header(AZURE_ASYNC_OPERATION, status_url.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": {"code": "Conflict", "message": "connector is in use"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).delete(ID, API).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::OperationFailed {
                status: "Failed".to_string(),
                message: "connector is in use".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn delete_polls_location_until_done() {
        let server = MockServer::start().await;
        let location = format!("{}/locations/op3", server.uri());
        Mock::given(method("DELETE"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(202).insert_header("Location", location.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/op3"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/op3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(client(&server).delete(ID, API).await.is_ok());
    }

    #[tokio::test]
    async fn delete_of_missing_resource_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(
            client(&server).delete(ID, API).await,
            Err(ClientError::NotFound)
        );
    }

    #[test]
    fn truncate_long_bodies() {
        let body = "é".repeat(150);
        let truncated = truncate(&body);
        assert!(truncated.ends_with("[truncated, 300 bytes total]"));
        assert_eq!(truncate("short"), "short");
    }
}
