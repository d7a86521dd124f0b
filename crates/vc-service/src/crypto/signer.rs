//! Upstream OpenAPI request signing.
//!
//! Implements the HMAC-SHA256 key-chain scheme the upstream gateway
//! verifies:
//!
//! ```text
//! canonical_request = METHOD \n path \n query \n headers \n signed_headers \n hex(sha256(body))
//! string_to_sign    = "HMAC-SHA256" \n timestamp \n scope \n hex(sha256(canonical_request))
//! scope             = date/region/service/request
//! k_date    = HMAC(secret_key, date)
//! k_region  = HMAC(k_date, region)
//! k_service = HMAC(k_region, service)
//! k_signing = HMAC(k_service, "request")
//! signature = hex(HMAC(k_signing, string_to_sign))
//! ```
//!
//! Signing is a pure function of its inputs, including the timestamp.

use super::{hmac_sha256, sha256_hex};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// Algorithm identifier placed in the string-to-sign and Authorization header.
pub const SIGNING_ALGORITHM: &str = "HMAC-SHA256";

/// Final component of every credential scope.
pub const SCOPE_TERMINATOR: &str = "request";

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("{0} must not be empty")]
    MissingCredential(&'static str),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Account access key pair.
#[derive(Clone)]
pub struct SigningCredentials {
    pub access_key_id: String,
    pub secret_key: SecretString,
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// The parts of an HTTP request covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedRequest {
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Result of signing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    /// Hex-encoded HMAC.
    pub signature: String,
    /// Value for the `Authorization` header.
    pub authorization: String,
    pub timestamp: String,
    pub credential_scope: String,
    pub signed_headers: String,
}

/// `X-Date` form of a timestamp (`YYYYMMDDTHHMMSSZ`).
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

/// Sign a request with account credentials.
#[instrument(skip_all, fields(region = %region, service = %service))]
pub fn sign(
    request: &UnsignedRequest,
    credentials: &SigningCredentials,
    region: &str,
    service: &str,
    timestamp: DateTime<Utc>,
) -> Result<RequestSignature, SignerError> {
    if credentials.access_key_id.is_empty() {
        return Err(SignerError::MissingCredential("accessKeyId"));
    }
    if credentials.secret_key.expose_secret().is_empty() {
        return Err(SignerError::MissingCredential("secretKey"));
    }

    let x_date = format_timestamp(timestamp);
    let date = format_date(timestamp);
    let credential_scope = format!("{}/{}/{}/{}", date, region, service, SCOPE_TERMINATOR);

    let (canonical, signed_headers) = canonical_request(request);
    let to_sign = string_to_sign(&x_date, &credential_scope, &canonical);

    let signing_key = derive_signing_key(&credentials.secret_key, &date, region, service)?;
    let signature = hex::encode(
        hmac_sha256(&signing_key, to_sign.as_bytes()).map_err(SignerError::Signing)?,
    );

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        SIGNING_ALGORITHM, credentials.access_key_id, credential_scope, signed_headers, signature
    );

    Ok(RequestSignature {
        signature,
        authorization,
        timestamp: x_date,
        credential_scope,
        signed_headers,
    })
}

/// Build the canonical request string and the signed-header list.
///
/// Header names are lower-cased and sorted, values trimmed; repeated
/// headers are joined with commas. `host` is taken from the request when no
/// explicit Host header is present.
pub fn canonical_request(request: &UnsignedRequest) -> (String, String) {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &request.headers {
        headers
            .entry(name.trim().to_ascii_lowercase())
            .or_default()
            .push(value.trim().to_string());
    }
    headers
        .entry("host".to_string())
        .or_insert_with(|| vec![request.host.trim().to_string()]);

    let canonical_headers: String = headers
        .iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let path = if request.path.is_empty() {
        "/"
    } else {
        request.path.as_str()
    };

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.to_ascii_uppercase(),
        path,
        canonical_query(&request.query),
        canonical_headers,
        signed_headers,
        sha256_hex(&request.body)
    );

    (canonical, signed_headers)
}

/// Percent-encode and sort query parameters by key, then value.
pub fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(timestamp: &str, credential_scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        SIGNING_ALGORITHM,
        timestamp,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    )
}

fn derive_signing_key(
    secret_key: &SecretString,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SignerError> {
    let k_date = hmac_sha256(secret_key.expose_secret().as_bytes(), date.as_bytes())
        .map_err(SignerError::Signing)?;
    let k_region = hmac_sha256(&k_date, region.as_bytes()).map_err(SignerError::Signing)?;
    let k_service = hmac_sha256(&k_region, service.as_bytes()).map_err(SignerError::Signing)?;
    hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes()).map_err(SignerError::Signing)
}
