//! Identity Store: user records, credential hashing, uniqueness.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::password;
use crate::authz;
use crate::blobs::{self, PhotoUpload};
use crate::db::models::{User, UserSummary};
use crate::db::{self as store};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

const USER_COLUMNS: &str = "id, username, email, password_hash, name, surname, \
                            date_of_birth, photo, bio, created_at, updated_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        name: row.get(4)?,
        surname: row.get(5)?,
        date_of_birth: row.get(6)?,
        photo: row.get(7)?,
        bio: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Registration input, before hashing.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub date_of_birth: Option<String>,
    pub bio: Option<String>,
}

impl NewUser {
    /// Trim fields and reject missing or malformed input.
    fn normalized(self) -> AppResult<Self> {
        let username = self.username.trim().to_string();
        let email = self.email.trim().to_string();
        let name = self.name.trim().to_string();
        let surname = self.surname.trim().to_string();

        for (value, field) in [
            (&username, "Username"),
            (&email, "Email"),
            (&name, "Name"),
            (&surname, "Surname"),
        ] {
            if value.is_empty() {
                return Err(AppError::validation(format!("{} is required", field)));
            }
        }
        if self.password.is_empty() {
            return Err(AppError::validation("Password is required"));
        }
        validate_email(&email)?;

        Ok(Self {
            username,
            password: self.password,
            email,
            name,
            surname,
            date_of_birth: normalize_date_of_birth(self.date_of_birth.as_deref())?,
            bio: non_empty(self.bio),
        })
    }
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Invalid email address"))
    }
}

/// Accepts `YYYY-MM-DD`; blank means not provided.
pub fn normalize_date_of_birth(value: Option<&str>) -> AppResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| AppError::validation("Date of birth must be YYYY-MM-DD")),
    }
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
}

pub fn find_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
    Ok(conn
        .query_row(&sql, params![username], user_from_row)
        .optional()?)
}

fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, params![email], user_from_row).optional()?)
}

pub fn get_user(conn: &Connection, id: &str) -> AppResult<User> {
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User"))
}

/// Username match is case-sensitive, email match exact.
pub fn ensure_available(conn: &Connection, username: &str, email: &str) -> AppResult<()> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 OR email = ?2",
        params![username, email],
        |row| row.get(0),
    )?;
    if taken {
        Err(AppError::DuplicateIdentity(
            "Username or email already exists".into(),
        ))
    } else {
        Ok(())
    }
}

fn insert_user(
    conn: &Connection,
    new: &NewUser,
    password_hash: &str,
    photo: Option<&str>,
) -> AppResult<User> {
    let id = store::new_id();
    let now = store::now();

    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, name, surname,
                            date_of_birth, photo, bio, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id,
            new.username,
            new.email,
            password_hash,
            new.name,
            new.surname,
            new.date_of_birth,
            photo,
            new.bio,
            now,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e, "users.username") || is_unique_violation(&e, "users.email") {
            AppError::DuplicateIdentity("Username or email already exists".into())
        } else {
            AppError::from(e)
        }
    })?;

    get_user(conn, &id)
}

/// Create an account. Duplicate and validation failures are detected before
/// anything is written. The photo, if any, is stored before the row; if the
/// row insert then fails the blob is discarded.
pub async fn register(
    state: &AppState,
    new: NewUser,
    photo: Option<PhotoUpload>,
) -> AppResult<User> {
    let new = new.normalized()?;
    if let Some(upload) = &photo {
        blobs::validate_photo(upload, state.config.storage.max_upload_bytes)?;
    }

    {
        let conn = state.db.get()?;
        ensure_available(&conn, &new.username, &new.email)?;
    }

    let hash = password::hash_password(&new.password, state.config.auth.bcrypt_cost).await?;

    let photo = match photo {
        Some(upload) => Some(state.blobs.put(upload).await?),
        None => None,
    };

    let result = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| insert_user(&conn, &new, &hash, photo.as_deref()));

    match result {
        Ok(user) => {
            tracing::info!("Registered user {} ({})", user.username, user.id);
            Ok(user)
        }
        Err(e) => {
            if let Some(name) = &photo {
                blobs::discard(state.blobs.as_ref(), name).await;
            }
            Err(e)
        }
    }
}

pub async fn change_password(
    state: &AppState,
    actor: &CurrentUser,
    old_password: &str,
    new_password: &str,
) -> AppResult<()> {
    let user = {
        let conn = state.db.get()?;
        get_user(&conn, &actor.id)?
    };
    authz::ensure_owner(actor, &user)?;

    if new_password.is_empty() {
        return Err(AppError::validation("New password is required"));
    }
    if !password::verify_password(old_password, &user.password_hash).await? {
        return Err(AppError::InvalidCredential("Wrong password entered.".into()));
    }

    let hash = password::hash_password(new_password, state.config.auth.bcrypt_cost).await?;

    let conn = state.db.get()?;
    conn.execute(
        "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        params![hash, store::now(), user.id],
    )?;
    tracing::info!("User {} changed password", user.username);
    Ok(())
}

/// Partial update of name/surname/bio/email/photo. Blank name, surname or
/// email leave the stored value alone; a blank bio clears it. A new photo
/// replaces the old one, whose blob is removed best-effort.
pub async fn update_profile(
    state: &AppState,
    actor: &CurrentUser,
    update: ProfileUpdate,
    photo: Option<PhotoUpload>,
) -> AppResult<User> {
    let user = {
        let conn = state.db.get()?;
        get_user(&conn, &actor.id)?
    };
    authz::ensure_owner(actor, &user)?;

    let name = non_empty(update.name).unwrap_or_else(|| user.name.clone());
    let surname = non_empty(update.surname).unwrap_or_else(|| user.surname.clone());
    let bio = match update.bio {
        Some(bio) => non_empty(Some(bio)),
        None => user.bio.clone(),
    };

    let email = match non_empty(update.email) {
        Some(email) if email != user.email => {
            validate_email(&email)?;
            let conn = state.db.get()?;
            if let Some(other) = find_by_email(&conn, &email)? {
                if other.id != user.id {
                    return Err(AppError::DuplicateIdentity("Email already in use".into()));
                }
            }
            email
        }
        _ => user.email.clone(),
    };

    if let Some(upload) = &photo {
        blobs::validate_photo(upload, state.config.storage.max_upload_bytes)?;
    }
    let new_photo = match photo {
        Some(upload) => Some(state.blobs.put(upload).await?),
        None => None,
    };

    let result = state.db.get().map_err(AppError::from).and_then(|conn| {
        conn.execute(
            "UPDATE users
             SET name = ?1, surname = ?2, bio = ?3, email = ?4,
                 photo = COALESCE(?5, photo), updated_at = ?6
             WHERE id = ?7",
            params![name, surname, bio, email, new_photo, store::now(), user.id],
        )
        .map_err(|e| {
            if is_unique_violation(&e, "users.email") {
                AppError::DuplicateIdentity("Email already in use".into())
            } else {
                AppError::from(e)
            }
        })
    });

    if let Err(e) = result {
        if let Some(name) = &new_photo {
            blobs::discard(state.blobs.as_ref(), name).await;
        }
        return Err(e);
    }

    if let (Some(_), Some(old)) = (&new_photo, &user.photo) {
        blobs::discard(state.blobs.as_ref(), old).await;
    }

    let conn = state.db.get()?;
    get_user(&conn, &user.id)
}

/// Clear the profile photo. No photo is not an error.
pub async fn delete_photo(state: &AppState, actor: &CurrentUser) -> AppResult<()> {
    let user = {
        let conn = state.db.get()?;
        get_user(&conn, &actor.id)?
    };
    authz::ensure_owner(actor, &user)?;

    let Some(old) = user.photo else {
        return Ok(());
    };

    {
        let conn = state.db.get()?;
        conn.execute(
            "UPDATE users SET photo = NULL, updated_at = ?1 WHERE id = ?2",
            params![store::now(), user.id],
        )?;
    }
    blobs::discard(state.blobs.as_ref(), &old).await;
    Ok(())
}

/// Delete a user and everything they own, in one transaction: likes and
/// comments they made, their posts with those posts' comments and likes,
/// then the user row. Returns the photo blobs left unreferenced.
pub fn delete_user(conn: &mut Connection, user_id: &str) -> AppResult<Vec<String>> {
    let tx = conn.transaction()?;

    let mut orphaned: Vec<String> = {
        let mut stmt =
            tx.prepare("SELECT photo FROM posts WHERE user_id = ?1 AND photo IS NOT NULL")?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let user_photo: Option<Option<String>> = tx
        .query_row(
            "SELECT photo FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(user_photo) = user_photo else {
        return Err(AppError::not_found("User"));
    };
    orphaned.extend(user_photo);

    tx.execute(
        "DELETE FROM likes
         WHERE user_id = ?1 OR post_id IN (SELECT id FROM posts WHERE user_id = ?1)",
        params![user_id],
    )?;
    tx.execute(
        "DELETE FROM comments
         WHERE user_id = ?1 OR post_id IN (SELECT id FROM posts WHERE user_id = ?1)",
        params![user_id],
    )?;
    tx.execute("DELETE FROM posts WHERE user_id = ?1", params![user_id])?;
    tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;

    tx.commit()?;
    Ok(orphaned)
}

/// Delete the caller's account after re-checking their password.
pub async fn delete_account(state: &AppState, actor: &CurrentUser, password: &str) -> AppResult<()> {
    let user = {
        let conn = state.db.get()?;
        get_user(&conn, &actor.id)?
    };
    authz::ensure_owner(actor, &user)?;

    if !password::verify_password(password, &user.password_hash).await? {
        return Err(AppError::InvalidCredential("Wrong password entered.".into()));
    }

    let orphaned = {
        let mut conn = state.db.get()?;
        delete_user(&mut conn, &user.id)?
    };
    for name in &orphaned {
        blobs::discard(state.blobs.as_ref(), name).await;
    }

    tracing::info!("Deleted user {} ({})", user.username, user.id);
    Ok(())
}

/// Everyone except `exclude_id`, for suggestions.
pub fn list_others(conn: &Connection, exclude_id: &str) -> AppResult<Vec<UserSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, photo FROM users WHERE id != ?1 ORDER BY username ASC",
    )?;
    let users = stmt
        .query_map(params![exclude_id], |row| {
            Ok(UserSummary {
                id: row.get(0)?,
                username: row.get(1)?,
                photo: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}
