//! Engagement Engine: the like toggle, like aggregates and user search.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::content;
use crate::db::models::{Post, UserSummary};
use crate::db::{self as store};
use crate::error::{AppError, AppResult};
use crate::identity;

/// Search results are capped at this many users.
pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub liked: bool,
    pub like_count: usize,
}

/// Like the post if `user_id` hasn't, unlike it if they have.
///
/// The lookup is only the fast path. `UNIQUE(user_id, post_id)` decides:
/// an insert that loses a race to a concurrent toggle changes nothing, and
/// the pair is reported as liked, which is what the store now holds.
pub fn toggle_like(conn: &Connection, user_id: &str, post_id: &str) -> AppResult<ToggleOutcome> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::not_found("Post"));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM likes WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(like_id) => {
            conn.execute("DELETE FROM likes WHERE id = ?1", params![like_id])?;
            Ok(ToggleOutcome {
                liked: false,
                like_count: count_likes(conn, post_id)?,
            })
        }
        None => insert_like(conn, user_id, post_id),
    }
}

/// Record the like. When the pair is already stored (a concurrent toggle
/// got there first) nothing changes and the outcome is still liked.
pub(crate) fn insert_like(
    conn: &Connection,
    user_id: &str,
    post_id: &str,
) -> AppResult<ToggleOutcome> {
    let inserted = conn.execute(
        "INSERT INTO likes (id, user_id, post_id, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, post_id) DO NOTHING",
        params![store::new_id(), user_id, post_id, store::now()],
    )?;
    if inserted == 0 {
        tracing::debug!("Like by {} on {} already present", user_id, post_id);
    }
    Ok(ToggleOutcome {
        liked: true,
        like_count: count_likes(conn, post_id)?,
    })
}

fn count_likes(conn: &Connection, post_id: &str) -> AppResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Derive `like_count` and `liked_by_viewer` from the loaded like rows.
pub fn apply_like_aggregates(posts: &mut [Post], viewer: Option<&str>) {
    for post in posts.iter_mut() {
        post.like_count = post.likes.len();
        post.liked_by_viewer =
            viewer.is_some_and(|id| post.likes.iter().any(|like| like.user_id == id));
    }
}

/// Ids of the posts among `posts` that `viewer` has liked.
pub fn liked_post_ids(posts: &[Post], viewer: Option<&str>) -> BTreeSet<String> {
    let Some(viewer) = viewer else {
        return BTreeSet::new();
    };
    posts
        .iter()
        .filter(|post| post.likes.iter().any(|like| like.user_id == viewer))
        .map(|post| post.id.clone())
        .collect()
}

/// Case-insensitive substring match on username, folding full Unicode
/// case. A blank query matches nobody.
pub fn search_users(conn: &Connection, query: &str) -> AppResult<Vec<UserSummary>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT id, username, photo FROM users ORDER BY username ASC")?;
    let mut rows = stmt.query([])?;
    let mut users = Vec::new();
    while let Some(row) = rows.next()? {
        let username: String = row.get(1)?;
        if !username.to_lowercase().contains(&needle) {
            continue;
        }
        users.push(UserSummary {
            id: row.get(0)?,
            username,
            photo: row.get(2)?,
        });
        if users.len() == SEARCH_LIMIT {
            break;
        }
    }
    Ok(users)
}

/// Posts `user_id` has liked, most recently liked first.
pub fn liked_posts(conn: &Connection, user_id: &str) -> AppResult<Vec<Post>> {
    identity::get_user(conn, user_id)?;
    content::select_posts(
        conn,
        "JOIN likes l ON l.post_id = p.id
         WHERE l.user_id = ?1
         ORDER BY l.created_at DESC, l.rowid DESC",
        params![user_id],
    )
}
