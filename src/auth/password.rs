use crate::error::{AppError, AppResult};

/// Hash a password with bcrypt on the blocking pool; the work factor makes
/// this deliberately slow.
pub async fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Failed to spawn blocking task: {}", e)))?
        .map_err(AppError::from)
}

/// Check a password against a stored hash. A corrupt hash counts as a
/// mismatch.
pub async fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(format!("Failed to spawn blocking task: {}", e)))
}
