//! JSON-RPC client over an authenticated transport.
//!
//! One client is bound to one endpoint and one transport. Ids are
//! allocated from a shared counter so concurrent calls never collide.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    Request, Response,
};
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::auth::{AuthTransport, TransportError};
use crate::protocol::{DecodeError, Envelope, JsonRpcError, JsonRpcId};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("request error: {0}")]
    Request(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bad reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("unexpected reply: {0}")]
    Unexpected(String),

    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct RpcClient {
    transport: Arc<AuthTransport>,
    next_id: AtomicI64,
}

impl RpcClient {
    pub fn new(transport: Arc<AuthTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Send a request and wait for its result.
    pub async fn call(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let id = JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let envelope = Envelope::Request {
            id: id.clone(),
            method: method.to_string(),
            params,
        };

        let response = self.post(&envelope).await?;
        match Envelope::decode(response.body())? {
            Envelope::Response { id: reply_id, outcome } if reply_id == id => {
                outcome.map_err(ClientError::Rpc)
            }
            Envelope::Response { id: reply_id, .. } => Err(ClientError::Unexpected(format!(
                "reply id {} does not match request id {}",
                reply_id, id
            ))),
            other => Err(ClientError::Unexpected(format!(
                "expected a response, got a {}",
                other.kind()
            ))),
        }
    }

    /// Send a notification. Any 2xx reply is accepted and its body ignored.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let envelope = Envelope::Notification {
            method: method.to_string(),
            params,
        };
        self.post(&envelope).await?;
        Ok(())
    }

    async fn post(&self, envelope: &Envelope) -> ClientResult<Response<Bytes>> {
        let body = envelope
            .to_vec()
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let request = Request::post(self.url())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(Body::from(body))
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        Ok(response)
    }
}
