//! Recompute the signature of a request captured by a wiremock upstream.
//!
//! The expected `Authorization` value is rebuilt from what actually went
//! over the wire (method, path, query, signed headers, body and `X-Date`),
//! so a match proves the proxy signed exactly the bytes it sent.

use chrono::NaiveDateTime;
use secrecy::SecretString;
use vc_service::crypto::signer::{self, SigningCredentials, UnsignedRequest};

/// Headers the proxy signs on every upstream call.
pub const SIGNED_HEADERS: [&str; 4] = ["content-type", "host", "x-content-sha256", "x-date"];

/// Header value from a captured request, or "" if absent.
pub fn captured_header(request: &wiremock::Request, name: &str) -> String {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The `Authorization` header the upstream would expect for `request`.
pub fn expected_authorization(
    request: &wiremock::Request,
    access_key_id: &str,
    secret_key: &str,
    region: &str,
    service: &str,
) -> String {
    let headers = SIGNED_HEADERS
        .iter()
        .map(|name| (name.to_string(), captured_header(request, name)))
        .collect();
    let query = request
        .url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let unsigned = UnsignedRequest {
        method: request.method.as_str().to_string(),
        host: captured_header(request, "host"),
        path: request.url.path().to_string(),
        query,
        headers,
        body: request.body.clone(),
    };

    let x_date = captured_header(request, "x-date");
    let timestamp = NaiveDateTime::parse_from_str(&x_date, "%Y%m%dT%H%M%SZ")
        .expect("X-Date should use the compact ISO 8601 form")
        .and_utc();

    let credentials = SigningCredentials {
        access_key_id: access_key_id.to_string(),
        secret_key: SecretString::from(secret_key),
    };

    signer::sign(&unsigned, &credentials, region, service, timestamp)
        .expect("captured request should be signable")
        .authorization
}
