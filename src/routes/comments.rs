use axum::extract::State;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::content;
use crate::db::models::Comment;
use crate::error::AppResult;
use crate::extractors::{ApiJson, ApiPath, CurrentUser};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: String,
    pub comment_body: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_comment))
        .route("/comments/{id}", delete(delete_comment))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let conn = state.db.get()?;
    let comment = content::create_comment(&conn, &user, &req.post_id, &req.comment_body)?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    content::delete_comment(&conn, &id, &user)?;
    Ok(Json(json!({ "message": "Comment deleted successfully" })))
}
