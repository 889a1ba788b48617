use std::collections::BTreeSet;

use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::authz;
use crate::content;
use crate::db::models::{Comment, Post};
use crate::engagement;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiPath, CurrentUser, MaybeUser};
use crate::routes::form::MultipartForm;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct BodyRequest {
    #[serde(rename = "postText")]
    pub body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFeed {
    pub posts: Vec<Post>,
    pub liked_post_ids: BTreeSet<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/by-user/{user_id}", get(list_posts_by_user))
        .route("/posts/{id}", get(get_post).delete(delete_post))
        .route("/posts/{id}/title", put(update_title))
        .route("/posts/{id}/body", put(update_body))
        .route("/posts/{id}/photo", put(update_photo).delete(remove_photo))
        .route("/posts/{id}/comments", get(list_comments))
}

fn viewer_id(viewer: &Option<CurrentUser>) -> Option<&str> {
    viewer.as_ref().map(|v| v.id.as_str())
}

/// Load a post and refuse unless `user` owns it.
fn owned_post(state: &AppState, user: &CurrentUser, id: &str) -> AppResult<Post> {
    let conn = state.db.get()?;
    let post = content::get_post(&conn, id)?;
    authz::ensure_owner(user, &post)?;
    Ok(post)
}

fn with_aggregates(mut post: Post, viewer: Option<&str>) -> Post {
    engagement::apply_like_aggregates(std::slice::from_mut(&mut post), viewer);
    post
}

async fn list_posts(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
) -> AppResult<Json<PostFeed>> {
    let conn = state.db.get()?;
    let mut posts = content::list_posts(&conn)?;
    engagement::apply_like_aggregates(&mut posts, viewer_id(&viewer));
    let liked_post_ids = engagement::liked_post_ids(&posts, viewer_id(&viewer));
    Ok(Json(PostFeed {
        posts,
        liked_post_ids,
    }))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    mut form: MultipartForm,
) -> AppResult<Json<Post>> {
    let title = form.take_required("title");
    let body = form.take_required("postText");

    let post = content::create_post(&state, &user, &title, &body, form.photo.take()).await?;
    Ok(Json(with_aggregates(post, Some(user.id.as_str()))))
}

async fn get_post(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    let post = content::get_post(&conn, &id)?;
    Ok(Json(with_aggregates(post, viewer_id(&viewer))))
}

async fn list_posts_by_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    ApiPath(user_id): ApiPath<String>,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let mut posts = content::list_posts_by_user(&conn, &user_id)?;
    engagement::apply_like_aggregates(&mut posts, viewer_id(&viewer));
    Ok(Json(posts))
}

async fn update_title(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<TitleRequest>,
) -> AppResult<Json<Post>> {
    owned_post(&state, &user, &id)?;
    let conn = state.db.get()?;
    let post = content::update_title(&conn, &id, &req.title)?;
    Ok(Json(with_aggregates(post, Some(user.id.as_str()))))
}

async fn update_body(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<BodyRequest>,
) -> AppResult<Json<Post>> {
    owned_post(&state, &user, &id)?;
    let conn = state.db.get()?;
    let post = content::update_body(&conn, &id, &req.body)?;
    Ok(Json(with_aggregates(post, Some(user.id.as_str()))))
}

async fn update_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
    form: MultipartForm,
) -> AppResult<Json<Post>> {
    owned_post(&state, &user, &id)?;
    let photo = form
        .photo
        .ok_or_else(|| AppError::validation("A photo is required"))?;

    let post = content::update_photo(&state, &id, Some(photo)).await?;
    Ok(Json(with_aggregates(post, Some(user.id.as_str()))))
}

async fn remove_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Post>> {
    owned_post(&state, &user, &id)?;
    let post = content::update_photo(&state, &id, None).await?;
    Ok(Json(with_aggregates(post, Some(user.id.as_str()))))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Value>> {
    owned_post(&state, &user, &id)?;
    content::delete_post(&state, &id).await?;
    Ok(Json(json!({ "message": "Delete successful" })))
}

async fn list_comments(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Vec<Comment>>> {
    let conn = state.db.get()?;
    Ok(Json(content::list_comments(&conn, &id)?))
}
