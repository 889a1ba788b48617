use serde::{Deserialize, Serialize};

/// A full user row. Never serialised directly: the hash stays server-side.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub date_of_birth: Option<String>,
    pub photo: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Owner summary attached to posts, comments and search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub photo: Option<String>,
}

/// Public profile visible to anyone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub photo: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

/// Profile as seen by its owner, for editing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub photo: Option<String>,
    pub bio: Option<String>,
    pub date_of_birth: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            photo: user.photo.clone(),
        }
    }
}

impl From<&User> for BasicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            surname: user.surname.clone(),
            photo: user.photo.clone(),
            bio: user.bio.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

impl From<&User> for OwnProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            surname: user.surname.clone(),
            email: user.email.clone(),
            photo: user.photo.clone(),
            bio: user.bio.clone(),
            date_of_birth: user.date_of_birth.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub created_at: String,
}

/// A post with its owner summary and like rows. `like_count` and
/// `liked_by_viewer` are derived, see `engagement::apply_like_aggregates`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(rename = "postText")]
    pub body: String,
    pub photo: Option<String>,
    pub user: UserSummary,
    pub created_at: String,
    pub updated_at: String,
    pub likes: Vec<Like>,
    pub like_count: usize,
    pub liked_by_viewer: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    #[serde(rename = "commentBody")]
    pub body: String,
    pub user_id: String,
    pub username: String,
    pub user_photo: Option<String>,
    pub created_at: String,
}
