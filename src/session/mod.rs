// ============================================================================
// Session lifecycle
// ============================================================================
//
// Issuance, validation, admin validation and destruction of login sessions.
// The manager owns no state beyond its injected stores; every operation has a
// clock-explicit `*_at` variant so expiry boundaries can be tested.
//
// ============================================================================

pub mod cookie;
pub mod models;
pub mod storage;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::utils::log_safe_id;

pub use models::{NewUser, Session, User, UserProfile};
pub use storage::{
    MemorySessionStore, MemoryUserStore, PostgresSessionStore, PostgresUserStore, SessionStore,
    UserStore,
};

/// Random bytes per token; hex-encoded to 64 characters
const TOKEN_BYTES: usize = 32;

/// Generate an unguessable session token (256 bits from the OS RNG)
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    /// Ready-to-send Set-Cookie directive
    pub cookie: String,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    config: SessionConfig,
    log_salt: String,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        config: SessionConfig,
        log_salt: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            users,
            config,
            log_salt: log_salt.into(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Issue a new session for `user_id`
    pub async fn create_session(&self, user_id: i64) -> Result<IssuedSession> {
        self.create_session_at(user_id, Utc::now()).await
    }

    pub async fn create_session_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<IssuedSession> {
        let ttl_hours = self.config.ttl_hours;
        let expires_at = Duration::try_hours(ttl_hours)
            .filter(|ttl| *ttl > Duration::zero())
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| anyhow::anyhow!("Invalid session TTL: {} hours", ttl_hours))?;
        let token = generate_token();

        let session = Session {
            token: token.clone(),
            user_id,
            created_at: now,
            expires_at,
        };
        self.sessions
            .create(&session)
            .await
            .context("Failed to persist session")?;

        tracing::info!(
            user_id = user_id,
            session = %log_safe_id(&token, &self.log_salt),
            expires_at = %expires_at,
            "Session created"
        );

        let cookie = cookie::session_cookie(
            &self.config.cookie_name,
            &token,
            expires_at,
            self.config.cookie_secure,
        );

        Ok(IssuedSession {
            token,
            user_id,
            expires_at,
            cookie,
        })
    }

    /// Owner of the session if the token is known and not yet expired
    pub async fn validate_session(&self, token: &str) -> Result<Option<i64>> {
        self.validate_session_at(token, Utc::now()).await
    }

    pub async fn validate_session_at(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        if token.is_empty() {
            return Ok(None);
        }

        let Some(session) = self.sessions.find_by_token(token).await? else {
            tracing::debug!(
                session = %log_safe_id(token, &self.log_salt),
                "Unknown session token"
            );
            return Ok(None);
        };

        if !session.is_valid_at(now) {
            tracing::debug!(
                session = %log_safe_id(token, &self.log_salt),
                user_id = session.user_id,
                "Session expired"
            );
            return Ok(None);
        }

        Ok(Some(session.user_id))
    }

    /// Owner of the session if it is valid and the owner is an administrator
    pub async fn validate_admin(&self, token: &str) -> Result<Option<i64>> {
        self.validate_admin_at(token, Utc::now()).await
    }

    pub async fn validate_admin_at(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        let Some(user_id) = self.validate_session_at(token, now).await? else {
            return Ok(None);
        };

        match self.users.find_by_id(user_id).await? {
            Some(user) if user.is_admin => Ok(Some(user.id)),
            Some(_) => {
                tracing::debug!(user_id = user_id, "Session owner is not an admin");
                Ok(None)
            }
            None => {
                tracing::warn!(user_id = user_id, "Session references a missing user");
                Ok(None)
            }
        }
    }

    /// Delete the session (if any) and return the clearing cookie directive
    pub async fn destroy_session(&self, token: &str) -> Result<String> {
        if !token.is_empty() {
            self.sessions.delete_by_token(token).await?;
            tracing::info!(
                session = %log_safe_id(token, &self.log_salt),
                "Session destroyed"
            );
        }

        Ok(cookie::clearing_cookie(
            &self.config.cookie_name,
            self.config.cookie_secure,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        manager: SessionManager,
        sessions: Arc<MemorySessionStore>,
        users: Arc<MemoryUserStore>,
    }

    async fn fixture() -> Fixture {
        let sessions = Arc::new(MemorySessionStore::new());
        let users = Arc::new(MemoryUserStore::new());
        let manager = SessionManager::new(
            sessions.clone(),
            users.clone(),
            SessionConfig::default(),
            "test-salt",
        );
        Fixture {
            manager,
            sessions,
            users,
        }
    }

    async fn add_user(users: &MemoryUserStore, name: &str) -> i64 {
        users
            .create(&NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_create_then_validate() {
        let f = fixture().await;
        let uid = add_user(&f.users, "alice").await;

        let issued = f.manager.create_session(uid).await.unwrap();
        assert!(issued.cookie.starts_with(&format!("session_token={};", issued.token)));
        assert!(issued.cookie.contains("HttpOnly"));
        assert!(issued.cookie.contains("SameSite=None"));
        assert!(issued.cookie.contains("Path=/"));

        assert_eq!(f.manager.validate_session(&issued.token).await.unwrap(), Some(uid));
        assert_eq!(f.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_unusable_ttl_is_an_error() {
        for ttl_hours in [0, -1, i64::MAX, 24 * 365 * 1_000_000] {
            let sessions = Arc::new(MemorySessionStore::new());
            let users = Arc::new(MemoryUserStore::new());
            let uid = add_user(&users, "ida").await;
            let manager = SessionManager::new(
                sessions.clone(),
                users,
                SessionConfig {
                    ttl_hours,
                    ..SessionConfig::default()
                },
                "test-salt",
            );

            assert!(manager.create_session(uid).await.is_err(), "{}", ttl_hours);
            assert_eq!(sessions.len().await, 0);
        }
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let f = fixture().await;
        let uid = add_user(&f.users, "bob").await;
        let issued_at = Utc::now();

        let issued = f.manager.create_session_at(uid, issued_at).await.unwrap();
        assert_eq!(issued.expires_at, issued_at + Duration::hours(24));

        let just_before = issued.expires_at - Duration::milliseconds(1);
        assert_eq!(
            f.manager.validate_session_at(&issued.token, just_before).await.unwrap(),
            Some(uid)
        );
        assert_eq!(
            f.manager.validate_session_at(&issued.token, issued.expires_at).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unknown_and_empty_tokens() {
        let f = fixture().await;
        assert_eq!(f.manager.validate_session(&"0".repeat(64)).await.unwrap(), None);
        assert_eq!(f.manager.validate_session("").await.unwrap(), None);
        assert_eq!(f.manager.validate_admin("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let f = fixture().await;
        let uid = add_user(&f.users, "carol").await;
        let issued = f.manager.create_session(uid).await.unwrap();

        let clearing = f.manager.destroy_session(&issued.token).await.unwrap();
        assert!(clearing.contains("Max-Age=0"));
        assert_eq!(f.manager.validate_session(&issued.token).await.unwrap(), None);

        let again = f.manager.destroy_session(&issued.token).await.unwrap();
        assert_eq!(clearing, again);
        assert!(f.manager.destroy_session("").await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_admin() {
        let f = fixture().await;
        let plain = add_user(&f.users, "dave").await;
        let admin = add_user(&f.users, "erin").await;
        f.users.set_admin(admin, true).await;

        let plain_session = f.manager.create_session(plain).await.unwrap();
        let admin_session = f.manager.create_session(admin).await.unwrap();

        assert_eq!(f.manager.validate_admin(&plain_session.token).await.unwrap(), None);
        assert_eq!(
            f.manager.validate_admin(&admin_session.token).await.unwrap(),
            Some(admin)
        );

        // An expired admin session is rejected like any other
        let later = admin_session.expires_at;
        assert_eq!(
            f.manager.validate_admin_at(&admin_session.token, later).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_session_for_missing_user_is_not_admin() {
        let f = fixture().await;
        let issued = f.manager.create_session(404).await.unwrap();
        assert_eq!(f.manager.validate_session(&issued.token).await.unwrap(), Some(404));
        assert_eq!(f.manager.validate_admin(&issued.token).await.unwrap(), None);
    }
}
