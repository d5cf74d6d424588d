//! Edge-proxy wire types and gateway error definitions.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::protocol::DecodeError;

/// Inbound edge-proxy event.
///
/// Headers and query parameters are single-valued; the edge front door has
/// already collapsed repeated keys.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    pub http_method: String,

    pub path: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub query_string_parameters: HashMap<String, String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,

    #[serde(default)]
    pub is_base64_encoded: bool,

    /// Only used for log correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<RequestContext>,
}

/// Subset of the edge request context the gateway cares about.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub request_id: Option<String>,

    #[serde(default)]
    pub stage: Option<String>,
}

impl ProxyEvent {
    /// Create an event with the given method and path and nothing else.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            http_method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string_parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_base64_encoded = false;
        self
    }

    pub fn with_base64_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_base64_encoded = true;
        self
    }

    /// Edge request id, if the front door supplied one.
    pub fn request_id(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.request_id.as_deref())
    }
}

/// Outbound edge-proxy response. Emitted exactly once per event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,

    #[serde(default)]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ProxyResponse {
    /// Bare status response with no headers and no body.
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            multi_value_headers: BTreeMap::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }
}

/// Errors surfaced by the gateway controller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The event's method, path, query or headers cannot form a request.
    #[error("bad http request: {0}")]
    Construction(String),

    /// The non-empty body is not a JSON-RPC message.
    #[error("bad json-rpc message: {0}")]
    ProtocolDecode(#[from] DecodeError),
}

impl From<axum::http::Error> for GatewayError {
    fn from(err: axum::http::Error) -> Self {
        GatewayError::Construction(err.to_string())
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserialize_with_nulls() {
        let raw = r#"{
            "httpMethod": "POST",
            "path": "/mcp",
            "headers": null,
            "queryStringParameters": null,
            "body": null,
            "isBase64Encoded": false
        }"#;

        let event: ProxyEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.http_method, "POST");
        assert!(event.headers.is_empty());
        assert!(event.query_string_parameters.is_empty());
        assert!(event.body.is_empty());
        assert!(event.request_id().is_none());
    }

    #[test]
    fn test_event_request_context() {
        let raw = r#"{
            "httpMethod": "POST",
            "path": "/mcp",
            "requestContext": {"requestId": "abc-123", "stage": "prod"}
        }"#;

        let event: ProxyEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.request_id(), Some("abc-123"));
    }

    #[test]
    fn test_response_wire_shape() {
        let mut resp = ProxyResponse::status(201);
        resp.multi_value_headers
            .insert("content-type".into(), vec!["application/json".into()]);
        resp.body = "{}".into();

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["multiValueHeaders"]["content-type"][0], "application/json");
        assert_eq!(json["body"], "{}");
        assert_eq!(json["isBase64Encoded"], false);
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Construction("invalid method".into());
        assert_eq!(err.to_string(), "bad http request: invalid method");
    }
}
