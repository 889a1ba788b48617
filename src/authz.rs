//! Ownership checks for mutations on owned resources.
//!
//! One rule: the acting identity may mutate a resource iff its id equals
//! the resource owner's id. Usernames are never compared. There is no
//! admin override.

use crate::db::models::{Comment, Post, User};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;

/// A resource with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> &str;

    /// Human-readable noun for the refusal message.
    fn describe() -> &'static str;
}

impl Owned for Post {
    fn owner_id(&self) -> &str {
        &self.user.id
    }

    fn describe() -> &'static str {
        "post"
    }
}

impl Owned for Comment {
    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn describe() -> &'static str {
        "comment"
    }
}

impl Owned for User {
    fn owner_id(&self) -> &str {
        &self.id
    }

    fn describe() -> &'static str {
        "profile"
    }
}

pub fn is_owner<R: Owned>(actor: &CurrentUser, resource: &R) -> bool {
    actor.id == resource.owner_id()
}

/// Fails with `Forbidden` unless `actor` owns `resource`.
pub fn ensure_owner<R: Owned>(actor: &CurrentUser, resource: &R) -> AppResult<()> {
    if is_owner(actor, resource) {
        Ok(())
    } else {
        tracing::debug!(
            "User {} refused mutation of {} owned by {}",
            actor.id,
            R::describe(),
            resource.owner_id()
        );
        Err(AppError::Forbidden(format!(
            "You cannot modify this {}",
            R::describe()
        )))
    }
}
