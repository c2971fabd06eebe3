use chrono::{DateTime, Utc};
use serde::Serialize;

/// A persisted login session
///
/// Sessions are created on login and deleted on logout. Their only mutable
/// aspect is existence; expiry is evaluated lazily against `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// 64 lowercase hex characters (256 random bits)
    pub token: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Strictly before expiry; a session is already invalid at `expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Registered principal
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Fields needed to insert a user; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Public projection of a user returned by the profile endpoint
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}
