//! Voice chat proxy error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. The
//! response body uses the `ResponseMetadata.Error` shape that RTC clients
//! already parse for upstream failures, so a client sees one error format
//! whether the failure is local or upstream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crate::crypto::access_token::TokenError;
use crate::crypto::signer::SignerError;
use serde::Serialize;
use thiserror::Error;

/// Voice chat proxy error type.
///
/// Maps to HTTP status codes:
/// - Validation: 400 Bad Request
/// - Upstream: 502 Bad Gateway
/// - Crypto, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum VcError {
    /// A required input or configuration value is missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The signed upstream call could not be completed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Token issuance or request signing failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Internal server error")]
    Internal,
}

impl VcError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            VcError::Validation(_) => 400,
            VcError::Upstream(_) => 502,
            VcError::Crypto(_) | VcError::Internal => 500,
        }
    }
}

impl From<TokenError> for VcError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::EmptyField(_)
            | TokenError::NoPrivileges
            | TokenError::DuplicatePrivilege(_)
            | TokenError::FieldTooLong(_) => VcError::Validation(err.to_string()),
            other => VcError::Crypto(other.to_string()),
        }
    }
}

impl From<SignerError> for VcError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::MissingCredential(_) => VcError::Validation(err.to_string()),
            SignerError::Signing(reason) => VcError::Crypto(reason),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "ResponseMetadata")]
    response_metadata: ResponseMetadata,
}

#[derive(Serialize)]
struct ResponseMetadata {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

impl IntoResponse for VcError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            VcError::Validation(reason) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason.clone())
            }
            VcError::Upstream(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "vc.upstream", reason = %reason, "Upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Upstream service is unavailable".to_string(),
                )
            }
            VcError::Crypto(reason) => {
                tracing::error!(target: "vc.crypto", reason = %reason, "Cryptographic operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CRYPTO_ERROR",
                    "An internal cryptographic error occurred".to_string(),
                )
            }
            VcError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            response_metadata: ResponseMetadata {
                error: ErrorDetail {
                    code: code.to_string(),
                    message,
                },
            },
        };

        (status, Json(error_response)).into_response()
    }
}
