//! AWS Signature Version 4 request signing.
//!
//! # Algorithm
//! ```text
//! canonical request = method \n uri \n query \n headers \n signed-headers \n payload-hash
//! string to sign    = AWS4-HMAC-SHA256 \n timestamp \n scope \n sha256(canonical request)
//! signing key       = HMAC chain over date, region, service, "aws4_request"
//! signature         = hex(HMAC(signing key, string to sign))
//! ```
//!
//! The signer mutates the request in place: it adds `host` when missing,
//! `x-amz-date`, `x-amz-security-token` for session credentials, and
//! `authorization`. Nothing else is touched.

use axum::http::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, HOST},
    Request, Uri,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::auth::types::{Credentials, TransportError, TransportResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// SHA-256 of the empty byte sequence.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

/// Headers that proxies and clients may rewrite in flight.
const UNSIGNED_HEADERS: &[&str] = &[
    "authorization",
    "user-agent",
    "x-amzn-trace-id",
    "expect",
    "transfer-encoding",
    "connection",
];

/// Inputs to one signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

/// Hex-encoded SHA-256 of a request payload.
pub fn payload_hash(body: &[u8]) -> String {
    if body.is_empty() {
        return EMPTY_PAYLOAD_SHA256.to_string();
    }
    hex::encode(Sha256::digest(body))
}

/// Sign `request` and inject the signature headers.
pub fn sign<B>(
    request: &mut Request<B>,
    payload_hash: &str,
    params: &SigningParams<'_>,
) -> TransportResult<()> {
    let amz_date = params.time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.time.format("%Y%m%d").to_string();

    if !request.headers().contains_key(HOST) {
        let host = host_header(request.uri())?;
        request.headers_mut().insert(HOST, host);
    }

    let headers = request.headers_mut();
    headers.remove(AUTHORIZATION);
    headers.insert(X_AMZ_DATE, header_value(&amz_date)?);
    match &params.credentials.session_token {
        Some(token) => {
            let mut value = header_value(token)?;
            value.set_sensitive(true);
            headers.insert(X_AMZ_SECURITY_TOKEN, value);
        }
        None => {
            headers.remove(X_AMZ_SECURITY_TOKEN);
        }
    }

    let (canonical_headers, signed_headers) = canonical_headers(request.headers())?;
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method().as_str(),
        canonical_uri(request.uri().path()),
        canonical_query(request.uri().query().unwrap_or("")),
        canonical_headers,
        signed_headers,
        payload_hash,
    );

    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, params.region, params.service
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes())),
    );

    let key = signing_key(
        &params.credentials.secret_access_key,
        &date,
        params.region,
        params.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, params.credentials.access_key_id, scope, signed_headers, signature
    );
    let mut value = header_value(&authorization)?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);

    tracing::trace!(
        signed_headers = %signed_headers,
        scope = %scope,
        "Request signed"
    );
    Ok(())
}

/// Derive the per-day signing key.
pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> TransportResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> TransportResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| TransportError::Signing(format!("invalid HMAC key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn header_value(value: &str) -> TransportResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Signing(format!("invalid header value: {}", e)))
}

fn host_header(uri: &Uri) -> TransportResult<HeaderValue> {
    let host = uri
        .host()
        .ok_or_else(|| TransportError::Signing(format!("request URI {} has no host", uri)))?;

    let default_port = match uri.scheme_str() {
        Some("https") => Some(443),
        Some("http") => Some(80),
        _ => None,
    };

    match uri.port_u16() {
        Some(port) if Some(port) != default_port => header_value(&format!("{}:{}", host, port)),
        _ => header_value(host),
    }
}

/// Lowercase, sorted, whitespace-trimmed headers and the signed header list.
fn canonical_headers(headers: &HeaderMap) -> TransportResult<(String, String)> {
    let mut names: Vec<&HeaderName> = headers
        .keys()
        .filter(|name| !UNSIGNED_HEADERS.contains(&name.as_str()))
        .collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    let mut canonical = String::new();
    for name in &names {
        let mut values = Vec::new();
        for value in headers.get_all(*name) {
            let text = value.to_str().map_err(|e| {
                TransportError::Signing(format!("header {} is not ASCII: {}", name, e))
            })?;
            values.push(text.split_whitespace().collect::<Vec<_>>().join(" "));
        }
        canonical.push_str(name.as_str());
        canonical.push(':');
        canonical.push_str(&values.join(","));
        canonical.push('\n');
    }

    let signed = names
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    Ok((canonical, signed))
}

/// The request path, URI-encoded once more on top of its wire escaping.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    uri_encode(path, false)
}

fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// RFC 3986 encoding: everything but unreserved characters is escaped.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(payload_hash(b""), EMPTY_PAYLOAD_SHA256);
        assert_eq!(hex::encode(Sha256::digest(b"")), EMPTY_PAYLOAD_SHA256);
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();

        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla() {
        let creds = example_credentials();
        let mut request = Request::get("https://example.amazonaws.com/")
            .body(())
            .unwrap();

        let params = SigningParams {
            credentials: &creds,
            region: "us-east-1",
            service: "service",
            time: example_time(),
        };
        sign(&mut request, EMPTY_PAYLOAD_SHA256, &params).unwrap();

        assert_eq!(request.headers()[HOST], "example.amazonaws.com");
        assert_eq!(request.headers()[X_AMZ_DATE], "20150830T123600Z");
        assert_eq!(
            request.headers()[AUTHORIZATION],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_session_token_is_signed() {
        let creds = example_credentials().with_session_token("session");
        let mut request = Request::post("https://api.example.com/prod/mcp")
            .header("content-type", "application/json")
            .body(())
            .unwrap();

        let params = SigningParams {
            credentials: &creds,
            region: "eu-west-1",
            service: "execute-api",
            time: example_time(),
        };
        sign(&mut request, &payload_hash(b"{}"), &params).unwrap();

        assert_eq!(request.headers()[X_AMZ_SECURITY_TOKEN], "session");
        let auth = request.headers()[AUTHORIZATION].to_str().unwrap();
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-security-token,"));
        assert!(auth.contains("/20150830/eu-west-1/execute-api/aws4_request"));
    }

    #[test]
    fn test_signature_depends_on_payload() {
        let creds = example_credentials();
        let params = SigningParams {
            credentials: &creds,
            region: "us-east-1",
            service: "execute-api",
            time: example_time(),
        };

        let mut a = Request::post("https://api.example.com/").body(()).unwrap();
        let mut b = Request::post("https://api.example.com/").body(()).unwrap();
        let mut c = Request::post("https://api.example.com/").body(()).unwrap();
        sign(&mut a, &payload_hash(b"one"), &params).unwrap();
        sign(&mut b, &payload_hash(b"two"), &params).unwrap();
        sign(&mut c, &payload_hash(b"one"), &params).unwrap();

        assert_ne!(a.headers()[AUTHORIZATION], b.headers()[AUTHORIZATION]);
        assert_eq!(a.headers()[AUTHORIZATION], c.headers()[AUTHORIZATION]);
    }

    #[test]
    fn test_resign_replaces_authorization() {
        let creds = example_credentials();
        let params = SigningParams {
            credentials: &creds,
            region: "us-east-1",
            service: "service",
            time: example_time(),
        };
        let mut request = Request::get("https://example.amazonaws.com/")
            .header(AUTHORIZATION, "Basic stale")
            .body(())
            .unwrap();

        sign(&mut request, EMPTY_PAYLOAD_SHA256, &params).unwrap();
        sign(&mut request, EMPTY_PAYLOAD_SHA256, &params).unwrap();

        assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert!(request.headers()[AUTHORIZATION]
            .to_str()
            .unwrap()
            .ends_with("5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"));
    }

    #[test]
    fn test_host_keeps_non_default_port() {
        let uri: Uri = "http://127.0.0.1:8080/mcp".parse().unwrap();
        assert_eq!(host_header(&uri).unwrap(), "127.0.0.1:8080");

        let uri: Uri = "https://api.example.com:443/mcp".parse().unwrap();
        assert_eq!(host_header(&uri).unwrap(), "api.example.com");

        let uri: Uri = "/relative".parse().unwrap();
        assert!(host_header(&uri).is_err());
    }

    #[test]
    fn test_canonical_uri_and_query() {
        assert_eq!(canonical_uri(""), "/");
        assert_eq!(canonical_uri("/prod/mcp"), "/prod/mcp");
        assert_eq!(canonical_uri("/a%20b"), "/a%2520b");

        assert_eq!(canonical_query(""), "");
        assert_eq!(canonical_query("b=2&a=1&a=0"), "a=0&a=1&b=2");
        assert_eq!(canonical_query("k=a+b&s=%2F"), "k=a%20b&s=%2F");
    }

    #[test]
    fn test_canonical_headers_trim_and_join() {
        let mut headers = HeaderMap::new();
        headers.insert("x-b", HeaderValue::from_static("  two   words "));
        headers.append("x-a", HeaderValue::from_static("1"));
        headers.append("x-a", HeaderValue::from_static("2"));
        headers.insert("user-agent", HeaderValue::from_static("ignored"));

        let (canonical, signed) = canonical_headers(&headers).unwrap();
        assert_eq!(canonical, "x-a:1,2\nx-b:two words\n");
        assert_eq!(signed, "x-a;x-b");
    }
}
