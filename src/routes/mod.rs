pub mod comments;
pub mod form;
pub mod identity;
pub mod likes;
pub mod posts;
pub mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Room for the text fields sent alongside a maximum-size photo.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// The full API with its middleware, ready to serve.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .merge(identity::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(likes::router())
        .route("/uploads/{filename}", get(uploads::serve))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
