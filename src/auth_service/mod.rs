// ============================================================================
// Auth Service
// ============================================================================
//
// Owns users and sessions. Endpoints:
// - POST /register          - create a user
// - POST /login             - verify credentials, issue the session cookie
// - POST /logout            - destroy the session, clear the cookie
// - POST /profile           - legacy alias of /logout
// - GET  /profile           - current user
// - GET  /validate-session  - {"user_id": n} for delegated checks
// - GET  /validate-admin    - {"admin_id": n} for delegated admin checks
// - GET  /health            - store ping
//
// ============================================================================

pub mod handlers;
pub mod password;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{LoggingConfig, SessionConfig};
use crate::middleware::request_logging;
use crate::session::{SessionManager, SessionStore, UserStore};

/// Auth Service context
pub struct AuthServiceContext {
    pub sessions: SessionManager,
    pub logging: LoggingConfig,
}

impl AuthServiceContext {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        user_store: Arc<dyn UserStore>,
        session: SessionConfig,
        logging: LoggingConfig,
    ) -> Self {
        let sessions = SessionManager::new(
            session_store,
            user_store,
            session,
            logging.hash_salt.clone(),
        );
        Self { sessions, logging }
    }
}

/// Assemble the auth service router
pub fn create_router(context: Arc<AuthServiceContext>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/profile", get(handlers::profile).post(handlers::logout))
        .route("/validate-session", get(handlers::validate_session))
        .route("/validate-admin", get(handlers::validate_admin))
        .with_state(context)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging)),
        )
}
