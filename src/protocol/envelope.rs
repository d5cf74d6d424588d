//! JSON-RPC 2.0 envelope decoding.
//!
//! # JSON-RPC 2.0 Compliance
//!
//! - Requests have `id`, `method`, and optional `params`
//! - Notifications are requests without `id`
//! - Responses have `id` and exactly one of `result` or `error`
//! - Only single messages are accepted; batches are rejected
//!
//! The gateway decodes envelopes for observability. Nothing here changes
//! how a call is dispatched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID. Strings and integers are preserved as sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{}", n),
            JsonRpcId::String(s) => write!(f, "{}", s),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A decoded JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        id: JsonRpcId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: JsonRpcId,
        outcome: Result<Value, JsonRpcError>,
    },
}

/// Why a body is not a JSON-RPC message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported jsonrpc version {0:?}")]
    Version(String),

    #[error("batch messages are not supported")]
    Batch,

    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("message is neither a request nor a response")]
    Shape,
}

/// Wire form shared by every message kind.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawMessage {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<JsonRpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// A `null` result is still a result.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Decode a single JSON-RPC message.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        if value.is_array() {
            return Err(DecodeError::Batch);
        }

        let raw: RawMessage = serde_json::from_value(value)?;
        if raw.jsonrpc != JSONRPC_VERSION {
            return Err(DecodeError::Version(raw.jsonrpc));
        }

        match (raw.method, raw.id, raw.result, raw.error) {
            (Some(method), Some(id), None, None) => Ok(Envelope::Request {
                id,
                method,
                params: raw.params,
            }),
            (Some(method), None, None, None) => Ok(Envelope::Notification {
                method,
                params: raw.params,
            }),
            (None, Some(id), Some(result), None) => Ok(Envelope::Response {
                id,
                outcome: Ok(result),
            }),
            (None, Some(id), None, Some(error)) => Ok(Envelope::Response {
                id,
                outcome: Err(error),
            }),
            _ => Err(DecodeError::Shape),
        }
    }

    /// Serialize back to wire JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut raw = RawMessage {
            jsonrpc: JSONRPC_VERSION.to_string(),
            ..RawMessage::default()
        };

        match self {
            Envelope::Request { id, method, params } => {
                raw.id = Some(id.clone());
                raw.method = Some(method.clone());
                raw.params = params.clone();
            }
            Envelope::Notification { method, params } => {
                raw.method = Some(method.clone());
                raw.params = params.clone();
            }
            Envelope::Response { id, outcome } => {
                raw.id = Some(id.clone());
                match outcome {
                    Ok(result) => raw.result = Some(result.clone()),
                    Err(error) => raw.error = Some(error.clone()),
                }
            }
        }

        serde_json::to_vec(&raw)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => "request",
            Envelope::Notification { .. } => "notification",
            Envelope::Response { .. } => "response",
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Envelope::Request { method, .. } | Envelope::Notification { method, .. } => {
                Some(method)
            }
            Envelope::Response { .. } => None,
        }
    }

    pub fn id(&self) -> Option<&JsonRpcId> {
        match self {
            Envelope::Request { id, .. } | Envelope::Response { id, .. } => Some(id),
            Envelope::Notification { .. } => None,
        }
    }
}
