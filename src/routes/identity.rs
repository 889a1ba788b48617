use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::session::{self, LoginResponse};
use crate::db::models::{BasicProfile, OwnProfile, Post, UserSummary};
use crate::engagement;
use crate::error::AppResult;
use crate::extractors::{ApiJson, ApiPath, ApiQuery, CurrentUser, MaybeUser};
use crate::identity::{self, NewUser, ProfileUpdate};
use crate::routes::form::MultipartForm;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/identity", post(register).get(search))
        .route("/identity/session", post(login).get(current_session))
        .route("/identity/all", get(list_users))
        .route(
            "/identity/profile",
            get(own_profile).put(update_profile).delete(delete_account),
        )
        .route("/identity/profile/photo", delete(delete_photo))
        .route("/identity/password", put(change_password))
        .route("/identity/{id}", get(basic_profile))
        .route("/identity/{id}/liked-posts", get(liked_posts))
}

async fn register(
    State(state): State<AppState>,
    mut form: MultipartForm,
) -> AppResult<Json<Value>> {
    let new = NewUser {
        username: form.take_required("username"),
        password: form.take_required("password"),
        email: form.take_required("email"),
        name: form.take_required("name"),
        surname: form.take_required("surname"),
        date_of_birth: form.take("dateOfBirth"),
        bio: form.take("bio"),
    };

    let user = identity::register(&state, new, form.photo.take()).await?;
    Ok(Json(json!({
        "success": true,
        "id": user.id,
        "username": user.username,
    })))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    Ok(Json(session::login(&state, &req.username, &req.password).await?))
}

/// The acting identity, re-read from the store.
async fn current_session(user: CurrentUser) -> Json<CurrentUser> {
    Json(user)
}

async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(engagement::search_users(&conn, &query.search)?))
}

async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(identity::list_others(&conn, &user.id)?))
}

async fn basic_profile(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<BasicProfile>> {
    let conn = state.db.get()?;
    let user = identity::get_user(&conn, &id)?;
    Ok(Json(BasicProfile::from(&user)))
}

async fn liked_posts(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    ApiPath(id): ApiPath<String>,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let mut posts = engagement::liked_posts(&conn, &id)?;
    engagement::apply_like_aggregates(&mut posts, viewer.as_ref().map(|v| v.id.as_str()));
    Ok(Json(posts))
}

async fn own_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<OwnProfile>> {
    let conn = state.db.get()?;
    let user = identity::get_user(&conn, &user.id)?;
    Ok(Json(OwnProfile::from(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    mut form: MultipartForm,
) -> AppResult<Json<Value>> {
    let update = ProfileUpdate {
        name: form.take("name"),
        surname: form.take("surname"),
        bio: form.take("bio"),
        email: form.take("email"),
    };

    let updated = identity::update_profile(&state, &user, update, form.photo.take()).await?;
    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": OwnProfile::from(&updated),
    })))
}

async fn delete_photo(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    identity::delete_photo(&state, &user).await?;
    Ok(Json(json!({ "message": "Profile photo deleted successfully" })))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    identity::change_password(&state, &user, &req.old_password, &req.new_password).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_account(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<DeleteAccountRequest>,
) -> AppResult<Json<Value>> {
    identity::delete_account(&state, &user, &req.password).await?;
    Ok(Json(json!({ "message": "Account deleted" })))
}
