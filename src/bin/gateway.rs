// ============================================================================
// API Gateway Service
// ============================================================================
//
// Single entry point for the portal's browser and mobile clients:
// - CORS for allow-listed frontends
// - Longest-prefix routing to the auth, blogs, events and attractions services
// - Delegated session checks for protected paths
// - Reverse proxying with backend redirect rewriting
//
// ============================================================================

use anyhow::{Context, Result};
use portal_server::config::Config;
use portal_server::gateway::GatewayRouter;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    portal_server::init_tracing(&config.rust_log);

    info!("=== API Gateway Service Starting ===");
    info!("Bind address: {}", config.bind_address);
    info!("Public URL: {}", config.gateway.public_url);
    info!("Auth service: {}", config.delegation.auth_service_url);

    let state = GatewayRouter::create_state(&config).context("Invalid gateway configuration")?;
    let app = GatewayRouter::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    info!("API Gateway listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    info!("API Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
