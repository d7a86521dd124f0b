//! Action proxy handler.

use crate::errors::VcError;
use crate::models::{ProxyBody, ProxyQuery};
use crate::routes::AppState;
use crate::services::ProxyOutcome;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /proxy?Action=..&Version=..
///
/// Body is `{SceneID, RoomId?, UserId?}`. It is parsed leniently: an empty
/// body counts as `{}`, and no particular Content-Type is required.
///
/// ## Response
///
/// - Upstream status and JSON body, unchanged
/// - `{"Result":"ok","message":"No active task to stop"}` for a Stop with
///   no bound room
/// - `ResponseMetadata.Error` on local failures
#[instrument(skip_all, name = "vc.proxy.action")]
pub async fn proxy_action(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
    body: Bytes,
) -> Result<Response, VcError> {
    let body = parse_body(&body)?;

    match state.action_proxy.handle(&query, &body).await? {
        ProxyOutcome::Forwarded(upstream) => {
            let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((status, Json(upstream.body)).into_response())
        }
        ProxyOutcome::NoActiveTask(ack) => Ok(Json(ack).into_response()),
    }
}

fn parse_body(raw: &[u8]) -> Result<ProxyBody, VcError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProxyBody::default());
    }
    serde_json::from_slice(raw)
        .map_err(|e| VcError::Validation(format!("Request body must be a JSON object: {e}")))
}
