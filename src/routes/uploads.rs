use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppResult;
use crate::extractors::ApiPath;
use crate::state::AppState;

/// Serve a stored photo by its generated name.
pub async fn serve(
    State(state): State<AppState>,
    ApiPath(filename): ApiPath<String>,
) -> AppResult<Response> {
    match state.blobs.get(&filename).await? {
        Some(data) => {
            let mime = mime_guess::from_path(&filename).first_or_octet_stream();
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response())
        }
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}
