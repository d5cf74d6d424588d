//! Buffering responder handed to the protocol handler.
//!
//! # Design Decisions
//! - The edge protocol has no way to express partial responses, so every
//!   byte is held until `finish`
//! - Status may be set at any time; the last value wins
//! - Headers are multi-valued and keep every appended value

use std::collections::BTreeMap;
use std::io;

use axum::http::{
    header::{HeaderMap, HeaderName, HeaderValue, IntoHeaderName},
    StatusCode,
};
use base64::{engine::general_purpose, Engine as _};
use bytes::{BufMut, BytesMut};

use crate::gateway::types::ProxyResponse;

/// Accumulates a handler's output and finalizes it into a `ProxyResponse`.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Append a header value, keeping any previous values under the same name.
    pub fn append_header<K: IntoHeaderName>(&mut self, key: K, value: HeaderValue) {
        self.headers.append(key, value);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Buffer body bytes.
    pub fn append_body(&mut self, chunk: &[u8]) {
        self.body.put_slice(chunk);
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Finalize into the single response emitted for this call.
    pub fn finish(self) -> ProxyResponse {
        let mut multi_value_headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.headers.keys() {
            let values = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| header_text(name, v))
                .collect();
            multi_value_headers.insert(name.as_str().to_string(), values);
        }

        let (body, is_base64_encoded) = match String::from_utf8(self.body.to_vec()) {
            Ok(text) => (text, false),
            Err(err) => (general_purpose::STANDARD.encode(err.as_bytes()), true),
        };

        ProxyResponse {
            status_code: self.status().as_u16(),
            multi_value_headers,
            body,
            is_base64_encoded,
        }
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append_body(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn header_text(name: &HeaderName, value: &HeaderValue) -> String {
    match value.to_str() {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!(header = %name, "Non-ASCII header value, converting lossily");
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        }
    }
}
