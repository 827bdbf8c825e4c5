pub(crate) mod books;
pub(crate) mod friends;
mod schema;

pub use books::BookRow;
pub use schema::Database;

pub(crate) use schema::{
    candidate_users, delete_user_row, find_user_by_id, find_user_by_username, genre_exists,
    language_exists, users_by_ids,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login, unique.
    pub username: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// User role: "admin" or "user".
    pub role: String,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

impl User {
    /// Label shown when picking a user: `username (last first)` when both names are known.
    pub fn label(&self) -> String {
        match (&self.last_name, &self.first_name) {
            (Some(last), Some(first)) if !last.is_empty() && !first.is_empty() => {
                format!("{} ({} {})", self.username, last, first)
            }
            _ => self.username.clone(),
        }
    }
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Profile extension of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Owning user ID.
    pub user_id: String,
    /// Profile picture file name.
    pub image: String,
}

/// Default profile picture.
pub const DEFAULT_PROFILE_IMAGE: &str = "default.jpg";

/// Book genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Genre ID.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Book language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Language ID.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Pending friend request from `requester_id` to `requested_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Request ID.
    pub id: i64,
    /// User who asked.
    pub requester_id: String,
    /// User who was asked.
    pub requested_id: String,
    /// When the request was sent.
    pub created_at: i64,
}

/// Confirmed friendship between two users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    /// Friendship ID.
    pub id: i64,
    /// The original requester.
    pub confirmed_user_id: String,
    /// The user who confirmed.
    pub requested_user_id: String,
    /// When the request was confirmed.
    pub confirmed_at: i64,
}

/// A rejected request, kept to notify the requester once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFriendship {
    /// Rejection ID.
    pub id: i64,
    /// User who rejected.
    pub rejecter_id: String,
    /// User whose request was rejected.
    pub rejected_id: String,
    /// When the request was rejected.
    pub rejected_at: i64,
    /// Whether the rejected user dismissed the notification.
    pub notif_deleted: bool,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
