//! Content Store: posts, comments and the likes attached to posts.
//!
//! Post mutations here are unconditional. Callers check ownership with
//! [`crate::authz::ensure_owner`] before invoking them. Comment deletion is
//! the exception and checks authorship itself.

use rusqlite::{params, Connection, OptionalExtension, Params};

use crate::authz;
use crate::blobs::{self, PhotoUpload};
use crate::db::models::{Comment, Like, Post, UserSummary};
use crate::db::{self as store};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::identity;
use crate::state::AppState;

const POST_SELECT: &str = "SELECT p.id, p.title, p.body, p.photo, p.user_id, u.username, u.photo,
                                  p.created_at, p.updated_at
                           FROM posts p
                           JOIN users u ON u.id = p.user_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.body, c.user_id, u.username, u.photo,
                                     c.created_at
                              FROM comments c
                              JOIN users u ON u.id = c.user_id";

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        photo: row.get(3)?,
        user: UserSummary {
            id: row.get(4)?,
            username: row.get(5)?,
            photo: row.get(6)?,
        },
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        likes: Vec::new(),
        like_count: 0,
        liked_by_viewer: false,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        body: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get(4)?,
        user_photo: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Trimmed, non-empty text or a validation error naming `field`.
fn required_text(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::validation(format!("{} cannot be empty", field)))
    } else {
        Ok(value.to_string())
    }
}

/// Posts matching `tail` (a WHERE/ORDER clause appended to the base select),
/// each with its likes loaded.
pub(crate) fn select_posts<P: Params>(
    conn: &Connection,
    tail: &str,
    params: P,
) -> AppResult<Vec<Post>> {
    let sql = format!("{} {}", POST_SELECT, tail);
    let mut stmt = conn.prepare(&sql)?;
    let mut posts = stmt
        .query_map(params, post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    load_likes(conn, &mut posts)?;
    Ok(posts)
}

/// Fill in the full like list of each post.
pub fn load_likes(conn: &Connection, posts: &mut [Post]) -> AppResult<()> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, post_id, created_at FROM likes
         WHERE post_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;
    for post in posts.iter_mut() {
        post.likes = stmt
            .query_map(params![post.id], |row| {
                Ok(Like {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    post_id: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(())
}

pub fn find_post(conn: &Connection, id: &str) -> AppResult<Option<Post>> {
    Ok(select_posts(conn, "WHERE p.id = ?1", params![id])?
        .into_iter()
        .next())
}

pub fn get_post(conn: &Connection, id: &str) -> AppResult<Post> {
    find_post(conn, id)?.ok_or_else(|| AppError::not_found("Post"))
}

fn ensure_post_exists(conn: &Connection, id: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(AppError::not_found("Post"))
    }
}

/// Newest first.
pub fn list_posts(conn: &Connection) -> AppResult<Vec<Post>> {
    select_posts(conn, "ORDER BY p.created_at DESC, p.rowid DESC", [])
}

pub fn list_posts_by_user(conn: &Connection, user_id: &str) -> AppResult<Vec<Post>> {
    identity::get_user(conn, user_id)?;
    select_posts(
        conn,
        "WHERE p.user_id = ?1 ORDER BY p.created_at DESC, p.rowid DESC",
        params![user_id],
    )
}

/// Create a post owned by `actor`. Title and body are checked before the
/// photo is written; a failed insert discards the written photo.
pub async fn create_post(
    state: &AppState,
    actor: &CurrentUser,
    title: &str,
    body: &str,
    photo: Option<PhotoUpload>,
) -> AppResult<Post> {
    let title = required_text(title, "Title")?;
    let body = required_text(body, "Post text")?;
    if let Some(upload) = &photo {
        blobs::validate_photo(upload, state.config.storage.max_upload_bytes)?;
    }

    let photo = match photo {
        Some(upload) => Some(state.blobs.put(upload).await?),
        None => None,
    };

    let id = store::new_id();
    let result = state.db.get().map_err(AppError::from).and_then(|conn| {
        let now = store::now();
        conn.execute(
            "INSERT INTO posts (id, user_id, title, body, photo, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, actor.id, title, body, photo, now],
        )?;
        get_post(&conn, &id)
    });

    match result {
        Ok(post) => {
            tracing::info!("User {} created post {}", actor.username, post.id);
            Ok(post)
        }
        Err(e) => {
            if let Some(name) = &photo {
                blobs::discard(state.blobs.as_ref(), name).await;
            }
            Err(e)
        }
    }
}

fn touch_column(conn: &Connection, post_id: &str, column: &str, value: &str) -> AppResult<Post> {
    let sql = format!(
        "UPDATE posts SET {} = ?1, updated_at = ?2 WHERE id = ?3",
        column
    );
    let changed = conn.execute(&sql, params![value, store::now(), post_id])?;
    if changed == 0 {
        return Err(AppError::not_found("Post"));
    }
    get_post(conn, post_id)
}

pub fn update_title(conn: &Connection, post_id: &str, title: &str) -> AppResult<Post> {
    let title = required_text(title, "Title")?;
    touch_column(conn, post_id, "title", &title)
}

pub fn update_body(conn: &Connection, post_id: &str, body: &str) -> AppResult<Post> {
    let body = required_text(body, "Post text")?;
    touch_column(conn, post_id, "body", &body)
}

/// Replace the post photo, or remove it with `None`. The previous blob,
/// if any, is discarded once the row is updated.
pub async fn update_photo(
    state: &AppState,
    post_id: &str,
    photo: Option<PhotoUpload>,
) -> AppResult<Post> {
    let previous = {
        let conn = state.db.get()?;
        get_post(&conn, post_id)?.photo
    };

    if let Some(upload) = &photo {
        blobs::validate_photo(upload, state.config.storage.max_upload_bytes)?;
    }
    let replacement = match photo {
        Some(upload) => Some(state.blobs.put(upload).await?),
        None => None,
    };

    let result = state.db.get().map_err(AppError::from).and_then(|conn| {
        let changed = conn.execute(
            "UPDATE posts SET photo = ?1, updated_at = ?2 WHERE id = ?3",
            params![replacement, store::now(), post_id],
        )?;
        if changed == 0 {
            return Err(AppError::not_found("Post"));
        }
        get_post(&conn, post_id)
    });

    match result {
        Ok(post) => {
            if let Some(old) = &previous {
                blobs::discard(state.blobs.as_ref(), old).await;
            }
            Ok(post)
        }
        Err(e) => {
            if let Some(name) = &replacement {
                blobs::discard(state.blobs.as_ref(), name).await;
            }
            Err(e)
        }
    }
}

/// Remove a post with its comments and likes in one transaction.
/// Returns the photo the post referenced.
pub fn delete_post_rows(conn: &mut Connection, post_id: &str) -> AppResult<Option<String>> {
    let tx = conn.transaction()?;

    let photo: Option<String> = tx
        .query_row(
            "SELECT photo FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("Post"))?;

    tx.execute("DELETE FROM likes WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
    tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;

    tx.commit()?;
    Ok(photo)
}

pub async fn delete_post(state: &AppState, post_id: &str) -> AppResult<()> {
    let photo = {
        let mut conn = state.db.get()?;
        delete_post_rows(&mut conn, post_id)?
    };
    if let Some(name) = &photo {
        blobs::discard(state.blobs.as_ref(), name).await;
    }
    tracing::info!("Deleted post {}", post_id);
    Ok(())
}

pub fn create_comment(
    conn: &Connection,
    actor: &CurrentUser,
    post_id: &str,
    body: &str,
) -> AppResult<Comment> {
    let body = required_text(body, "Comment")?;
    ensure_post_exists(conn, post_id)?;

    let id = store::new_id();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, actor.id, body, store::now()],
    )?;

    find_comment(conn, &id)?.ok_or_else(|| AppError::not_found("Comment"))
}

pub fn find_comment(conn: &Connection, id: &str) -> AppResult<Option<Comment>> {
    let sql = format!("{} WHERE c.id = ?1", COMMENT_SELECT);
    Ok(conn
        .query_row(&sql, params![id], comment_from_row)
        .optional()?)
}

/// Oldest first; same-millisecond comments keep insertion order.
pub fn list_comments(conn: &Connection, post_id: &str) -> AppResult<Vec<Comment>> {
    ensure_post_exists(conn, post_id)?;
    let sql = format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.rowid ASC",
        COMMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map(params![post_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn delete_comment(conn: &Connection, comment_id: &str, actor: &CurrentUser) -> AppResult<()> {
    let comment = find_comment(conn, comment_id)?.ok_or_else(|| AppError::not_found("Comment"))?;
    authz::ensure_owner(actor, &comment)?;

    conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::png;
    use crate::test_support::{acting, register, test_state};

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
            r.get(0)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_get_post() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;

        let post = create_post(&state, &acting(&alice), " Hello ", "World", None)
            .await
            .unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.user.username, "alice");
        assert!(post.likes.is_empty());

        let conn = state.db.get().unwrap();
        let fetched = get_post(&conn, &post.id).unwrap();
        assert_eq!(fetched.body, "World");
        assert_eq!(fetched.user.id, alice.id);
    }

    #[tokio::test]
    async fn empty_title_or_body_writes_nothing() {
        let (tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;

        let err = create_post(&state, &acting(&alice), "  ", "World", Some(png("a.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = create_post(&state, &acting(&alice), "Hello", "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let conn = state.db.get().unwrap();
        assert_eq!(count(&conn, "posts"), 0);
        let uploads = std::fs::read_dir(tmp.path().join("uploads")).unwrap().count();
        assert_eq!(uploads, 0);
    }

    #[tokio::test]
    async fn get_missing_post_is_not_found() {
        let (_tmp, state) = test_state();
        let conn = state.db.get().unwrap();
        assert!(matches!(
            get_post(&conn, "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_posts_by_user_filters_owner() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let bob = register(&state, "bob", "secret2").await;
        create_post(&state, &acting(&alice), "A", "a", None).await.unwrap();
        create_post(&state, &acting(&bob), "B", "b", None).await.unwrap();

        let conn = state.db.get().unwrap();
        let all = list_posts(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "B");

        let mine = list_posts_by_user(&conn, &alice.id).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "A");

        assert!(matches!(
            list_posts_by_user(&conn, "nobody"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_title_and_body() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let post = create_post(&state, &acting(&alice), "Hello", "World", None)
            .await
            .unwrap();

        let conn = state.db.get().unwrap();
        let updated = update_title(&conn, &post.id, "Hi").unwrap();
        assert_eq!(updated.title, "Hi");
        let updated = update_body(&conn, &post.id, "Everyone").unwrap();
        assert_eq!(updated.body, "Everyone");

        assert!(matches!(
            update_title(&conn, &post.id, ""),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            update_body(&conn, "missing", "x"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_photo_replaces_and_clears_blob() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let post = create_post(&state, &acting(&alice), "Hello", "World", Some(png("a.png")))
            .await
            .unwrap();
        let first = post.photo.clone().unwrap();

        let post = update_photo(&state, &post.id, Some(png("b.png")))
            .await
            .unwrap();
        let second = post.photo.clone().unwrap();
        assert!(state.blobs.get(&first).await.unwrap().is_none());
        assert!(state.blobs.get(&second).await.unwrap().is_some());

        let post = update_photo(&state, &post.id, None).await.unwrap();
        assert!(post.photo.is_none());
        assert!(state.blobs.get(&second).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_post_cascades_to_comments_and_likes() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let bob = register(&state, "bob", "secret2").await;
        let post = create_post(&state, &acting(&alice), "Hello", "World", Some(png("a.png")))
            .await
            .unwrap();
        let keep = create_post(&state, &acting(&alice), "Keep", "Me", None)
            .await
            .unwrap();

        {
            let conn = state.db.get().unwrap();
            create_comment(&conn, &acting(&bob), &post.id, "nice").unwrap();
            create_comment(&conn, &acting(&bob), &keep.id, "also nice").unwrap();
            crate::engagement::toggle_like(&conn, &bob.id, &post.id).unwrap();
            crate::engagement::toggle_like(&conn, &bob.id, &keep.id).unwrap();
        }

        delete_post(&state, &post.id).await.unwrap();

        let conn = state.db.get().unwrap();
        assert_eq!(count(&conn, "posts"), 1);
        assert_eq!(count(&conn, "comments"), 1);
        assert_eq!(count(&conn, "likes"), 1);
        assert!(state
            .blobs
            .get(post.photo.as_deref().unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_user_cascades_transitively() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let bob = register(&state, "bob", "secret2").await;
        let alices = create_post(&state, &acting(&alice), "A", "a", None).await.unwrap();
        let bobs = create_post(&state, &acting(&bob), "B", "b", None).await.unwrap();

        let mut conn = state.db.get().unwrap();
        // bob engages with alice's post, alice with bob's
        create_comment(&conn, &acting(&bob), &alices.id, "hi").unwrap();
        crate::engagement::toggle_like(&conn, &bob.id, &alices.id).unwrap();
        create_comment(&conn, &acting(&alice), &bobs.id, "hey").unwrap();
        crate::engagement::toggle_like(&conn, &alice.id, &bobs.id).unwrap();

        identity::delete_user(&mut conn, &alice.id).unwrap();

        assert_eq!(count(&conn, "users"), 1);
        assert_eq!(count(&conn, "posts"), 1);
        assert_eq!(count(&conn, "comments"), 0);
        assert_eq!(count(&conn, "likes"), 0);
        assert!(get_post(&conn, &bobs.id).unwrap().likes.is_empty());
    }

    #[tokio::test]
    async fn comments_are_listed_oldest_first() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let post = create_post(&state, &acting(&alice), "Hello", "World", None)
            .await
            .unwrap();

        let conn = state.db.get().unwrap();
        for body in ["first", "second", "third"] {
            create_comment(&conn, &acting(&alice), &post.id, body).unwrap();
        }
        let bodies: Vec<String> = list_comments(&conn, &post.id)
            .unwrap()
            .into_iter()
            .map(|c| c.body)
            .collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn create_comment_validates_input_and_post() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let post = create_post(&state, &acting(&alice), "Hello", "World", None)
            .await
            .unwrap();

        let conn = state.db.get().unwrap();
        assert!(matches!(
            create_comment(&conn, &acting(&alice), &post.id, "   "),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_comment(&conn, &acting(&alice), "missing", "hi"),
            Err(AppError::NotFound(_))
        ));

        let comment = create_comment(&conn, &acting(&alice), &post.id, "hi").unwrap();
        assert_eq!(comment.username, "alice");
        assert_eq!(comment.post_id, post.id);
    }

    #[tokio::test]
    async fn only_author_deletes_comment() {
        let (_tmp, state) = test_state();
        let alice = register(&state, "alice", "secret1").await;
        let bob = register(&state, "bob", "secret2").await;
        let post = create_post(&state, &acting(&alice), "Hello", "World", None)
            .await
            .unwrap();

        let conn = state.db.get().unwrap();
        let comment = create_comment(&conn, &acting(&bob), &post.id, "mine").unwrap();

        // the post owner is not the comment author
        assert!(matches!(
            delete_comment(&conn, &comment.id, &acting(&alice)),
            Err(AppError::Forbidden(_))
        ));
        delete_comment(&conn, &comment.id, &acting(&bob)).unwrap();
        assert!(list_comments(&conn, &post.id).unwrap().is_empty());

        assert!(matches!(
            delete_comment(&conn, &comment.id, &acting(&bob)),
            Err(AppError::NotFound(_))
        ));
    }
}
