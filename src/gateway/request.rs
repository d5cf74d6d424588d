//! Edge event to canonical request conversion.
//!
//! # Responsibilities
//! - Copy method and path verbatim (no normalization); bytes the URI grammar
//!   refuses are percent-encoded, everything else is kept byte-for-byte
//! - Copy single-valued headers, last write wins
//! - Re-encode query parameters with form percent-encoding
//! - Wrap the body so base64 payloads are decoded lazily on read
//!
//! # Design Decisions
//! - The canonical request is a plain `http::Request`, so any handler written
//!   against the `http` types can consume it
//! - Body decoding is deferred to the reader; malformed base64 surfaces as an
//!   `io::Error` on read, not at construction

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Cursor, Read};

use axum::http::{
    header::{HeaderName, HeaderValue},
    uri::PathAndQuery,
    Method, Request, Uri,
};
use base64::{
    engine::{general_purpose, GeneralPurpose},
    read::DecoderReader,
};
use url::form_urlencoded;

use crate::gateway::types::{GatewayError, GatewayResult, ProxyEvent};

static BASE64: GeneralPurpose = general_purpose::STANDARD;

/// Canonical request handed to the protocol handler.
pub type ProxyRequest = Request<RequestBody>;

/// Lazily-read request body.
pub enum RequestBody {
    Raw(Cursor<Vec<u8>>),
    Base64(DecoderReader<'static, GeneralPurpose, Cursor<Vec<u8>>>),
}

impl RequestBody {
    pub fn empty() -> Self {
        RequestBody::Raw(Cursor::new(Vec::new()))
    }

    /// Drain the remaining body into a buffer.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for RequestBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RequestBody::Raw(reader) => reader.read(buf),
            RequestBody::Base64(reader) => reader.read(buf),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Raw(_) => f.write_str("RequestBody::Raw"),
            RequestBody::Base64(_) => f.write_str("RequestBody::Base64"),
        }
    }
}

/// Build the canonical request for an edge event.
pub fn into_request(event: ProxyEvent) -> GatewayResult<ProxyRequest> {
    let method = Method::from_bytes(event.http_method.as_bytes()).map_err(|e| {
        GatewayError::Construction(format!("invalid method {:?}: {}", event.http_method, e))
    })?;

    let uri = request_uri(&event.path, &event.query_string_parameters)?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(RequestBody::empty())?;

    let headers = request.headers_mut();
    for (key, value) in &event.headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            GatewayError::Construction(format!("invalid header name {:?}: {}", key, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            GatewayError::Construction(format!("invalid value for header {:?}: {}", key, e))
        })?;
        headers.insert(name, value);
    }

    *request.body_mut() = request_body(event);
    Ok(request)
}

/// Resolve the event body into a byte source, decoding base64 lazily.
fn request_body(event: ProxyEvent) -> RequestBody {
    let raw = Cursor::new(event.body.into_bytes());

    if event.is_base64_encoded {
        RequestBody::Base64(DecoderReader::new(raw, &BASE64))
    } else {
        RequestBody::Raw(raw)
    }
}

fn request_uri(path: &str, params: &HashMap<String, String>) -> GatewayResult<Uri> {
    let (path, existing) = match path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (path, ""),
    };
    let path = if path.is_empty() {
        "/".to_string()
    } else {
        escape_path(path)
    };

    // Keys are emitted in sorted order; values keep their insertion order.
    let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(existing.as_bytes()) {
        query.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    for (key, value) in params {
        query.entry(key.clone()).or_default().push(value.clone());
    }

    let path_and_query = if query.is_empty() {
        path.clone()
    } else {
        let mut encoded = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &query {
            for value in values {
                encoded.append_pair(key, value);
            }
        }
        format!("{}?{}", path, encoded.finish())
    };

    let path_and_query = PathAndQuery::try_from(path_and_query.as_str()).map_err(|e| {
        GatewayError::Construction(format!("invalid path {:?}: {}", path, e))
    })?;

    Ok(Uri::builder().path_and_query(path_and_query).build()?)
}

/// Edge paths arrive URL-decoded, so they may carry spaces and other bytes
/// `http::Uri` rejects. Only those are escaped. `#` is escaped too, since it
/// would otherwise cut the path short as a fragment.
fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\x00'..='\x20' | '\x7f' | '<' | '>' | '`' | '#' => {
                escaped.push_str(&format!("%{:02X}", c as u8));
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
