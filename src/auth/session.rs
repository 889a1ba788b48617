use serde::Serialize;

use crate::auth::password;
use crate::auth::token::{TokenError, TokenSigner};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::identity;
use crate::state::AppState;

/// Returned by a successful login: the token plus a minimal profile snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub id: String,
    pub photo: Option<String>,
}

/// Check credentials and issue a signed session token.
pub async fn login(state: &AppState, username: &str, password: &str) -> AppResult<LoginResponse> {
    let wrong = || AppError::InvalidCredential("Wrong username and password combination.".into());

    let user = {
        let conn = state.db.get()?;
        identity::find_by_username(&conn, username.trim())?
    }
    .ok_or_else(wrong)?;

    if !password::verify_password(password, &user.password_hash).await? {
        tracing::debug!("Failed login for {}", user.username);
        return Err(wrong());
    }

    let token = state.tokens.issue(&user.id, &user.username);
    tracing::info!("User {} logged in", user.username);

    Ok(LoginResponse {
        token,
        username: user.username,
        id: user.id,
        photo: user.photo,
    })
}

/// Verify a token and resolve it to the current state of the user it names.
/// Only the id is taken from the token; username and photo are re-read.
pub fn resolve(
    conn: &rusqlite::Connection,
    signer: &TokenSigner,
    token: &str,
) -> AppResult<CurrentUser> {
    let claims = signer.verify(token).map_err(|e| {
        tracing::debug!("Rejected session token: {}", e);
        match e {
            TokenError::Expired => AppError::Unauthenticated("Session expired".into()),
            TokenError::Malformed | TokenError::BadSignature => {
                AppError::Unauthenticated("Invalid token".into())
            }
        }
    })?;

    let user = identity::find_by_id(conn, &claims.sub)?
        .ok_or_else(|| AppError::Unauthenticated("User not found".into()))?;

    Ok(CurrentUser {
        id: user.id,
        username: user.username,
        photo: user.photo,
    })
}
