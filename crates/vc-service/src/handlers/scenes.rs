//! Scene listing handler.

use crate::errors::VcError;
use crate::models::ScenesResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET|POST /getScenes
///
/// Returns every scene with RTC join parameters:
///
/// ```json
/// {
///   "scenes": [
///     {
///       "scene": { "id": "Custom", "name": "Custom", "botName": "ai_bot_Custom", ... },
///       "rtc": { "AppId": "...", "RoomId": "...", "UserId": "...", "Token": "..." }
///     }
///   ]
/// }
/// ```
#[instrument(skip_all, name = "vc.scenes.list")]
pub async fn get_scenes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScenesResponse>, VcError> {
    let response = state.scene_lister.list()?;
    Ok(Json(response))
}
