use super::models::{NewUser, Session, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage interface for session records
///
/// Implementations:
/// - PostgreSQL (`sessions` table, production)
/// - in-memory (tests and local development without a database)
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a freshly issued session
    async fn create(&self, session: &Session) -> Result<()>;

    /// Find a session by its token, expired or not
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Delete a session by token. Deleting an unknown token is not an error.
    async fn delete_by_token(&self, token: &str) -> Result<()>;

    /// Cheap reachability check for health endpoints
    async fn ping(&self) -> Result<()>;
}

/// Read side of the principal store plus registration
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a user. Returns `None` when the email or username is taken.
    async fn create(&self, new_user: &NewUser) -> Result<Option<User>>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL implementation of SessionStore
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert session")?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, (String, i64, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT token, user_id, created_at, expires_at
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up session")?;

        Ok(row.map(|(token, user_id, created_at, expires_at)| Session {
            token,
            user_id,
            created_at,
            expires_at,
        }))
    }

    async fn delete_by_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}

/// PostgreSQL implementation of UserStore
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, is_admin
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up user by id")
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, is_admin
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up user by email")
    }

    async fn create(&self, new_user: &NewUser) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING id, username, email, password_hash, is_admin
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert user")
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory SessionStore keyed by token
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.token) {
            anyhow::bail!("duplicate session token");
        }
        sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn delete_by_token(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory UserStore with sequential ids starting at 1
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the admin flag of an existing user (there is no HTTP surface for it)
    pub async fn set_admin(&self, id: i64, is_admin: bool) -> bool {
        let mut users = self.users.write().await;
        match users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_admin = is_admin;
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create(&self, new_user: &NewUser) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let taken = users
            .iter()
            .any(|u| u.email == new_user.email || u.username == new_user.username);
        if taken {
            return Ok(None);
        }

        let user = User {
            id: users.len() as i64 + 1,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            is_admin: false,
        };
        users.push(user.clone());
        Ok(Some(user))
    }
}
