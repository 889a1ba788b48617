//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::auth::token::TokenSigner;
use crate::blobs::LocalBlobStore;
use crate::config::Config;
use crate::db;
use crate::db::models::User;
use crate::extractors::CurrentUser;
use crate::identity::{self, NewUser};
use crate::state::AppState;

/// Fresh state over an in-memory database, uploads in a temp dir.
/// bcrypt runs at the minimum cost so tests stay quick.
pub fn test_state() -> (tempfile::TempDir, AppState) {
    let tmp = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.resolve_paths(tmp.path());

    let blobs =
        LocalBlobStore::open(config.uploads_path(), config.storage.max_upload_bytes).unwrap();

    let state = AppState {
        db: db::test_pool(),
        tokens: Arc::new(TokenSigner::new(b"test-secret", config.auth.token_hours).unwrap()),
        blobs: Arc::new(blobs),
        config,
    };
    (tmp, state)
}

pub fn new_user(username: &str, password: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        password: password.to_string(),
        email: format!("{}@example.com", username),
        name: "Test".to_string(),
        surname: "User".to_string(),
        date_of_birth: None,
        bio: None,
    }
}

pub async fn register(state: &AppState, username: &str, password: &str) -> User {
    identity::register(state, new_user(username, password), None)
        .await
        .unwrap()
}

/// The request identity for `user`.
pub fn acting(user: &User) -> CurrentUser {
    CurrentUser {
        id: user.id.clone(),
        username: user.username.clone(),
        photo: user.photo.clone(),
    }
}
