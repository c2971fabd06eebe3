// ============================================================================
// Auth Service
// ============================================================================
//
// Authentication service for the portal backend.
// Handles:
// - User registration
// - Login (session cookie issuance)
// - Logout (session destruction)
// - Session and admin validation for delegated checks
//
// Architecture:
// - Sessions are server-side rows; the cookie only carries an opaque token
// - Every other service asks this one whether a cookie is valid
//
// ============================================================================

use anyhow::{Context, Result};
use portal_server::auth_service::{create_router, AuthServiceContext};
use portal_server::config::Config;
use portal_server::db;
use portal_server::session::{
    MemorySessionStore, MemoryUserStore, PostgresSessionStore, PostgresUserStore, SessionStore,
    UserStore,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    portal_server::init_tracing(&config.rust_log);

    info!("=== Auth Service Starting ===");
    info!("Bind address: {}", config.bind_address);
    info!("Session TTL: {}h", config.session.ttl_hours);

    let (session_store, user_store): (Arc<dyn SessionStore>, Arc<dyn UserStore>) =
        match &config.database_url {
            Some(database_url) => {
                info!("Connecting to database...");
                let pool = db::create_pool(database_url, &config.db).await?;
                db::run_migrations(&pool).await?;
                info!("Connected to database, migrations applied");
                (
                    Arc::new(PostgresSessionStore::new(pool.clone())),
                    Arc::new(PostgresUserStore::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory stores (data is lost on restart)");
                (
                    Arc::new(MemorySessionStore::new()),
                    Arc::new(MemoryUserStore::new()),
                )
            }
        };

    let context = Arc::new(AuthServiceContext::new(
        session_store,
        user_store,
        config.session.clone(),
        config.logging.clone(),
    ));
    let app = create_router(context);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    info!("Auth Service listening on {}", config.bind_address);

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
