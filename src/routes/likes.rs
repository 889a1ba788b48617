use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::engagement::{self, ToggleOutcome};
use crate::error::AppResult;
use crate::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub post_id: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/likes", post(toggle_like))
}

async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<LikeRequest>,
) -> AppResult<Json<ToggleOutcome>> {
    let conn = state.db.get()?;
    let outcome = engagement::toggle_like(&conn, &user.id, &req.post_id)?;
    tracing::debug!(
        "User {} toggled like on {}: liked={}",
        user.username,
        req.post_id,
        outcome.liked
    );
    Ok(Json(outcome))
}
