// ============================================================================
// Gateway Router
// ============================================================================
//
// Every request that is not a gateway health probe goes through:
//   resolve prefix -> [delegated session check] -> forward to backend
//
// The check runs only when the route table says the path needs a session.
// The verified AuthContext is placed in the request extensions; it is never
// turned into a header for the backend, which re-checks the cookie itself.
//
// ============================================================================

use axum::{
    body::Body,
    extract::{Request, State},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::cors::{cors_gate, CorsPolicy};
use super::routes::{normalize_path, RouteTable};
use super::service_client::ServiceClient;
use crate::config::Config;
use crate::delegation::AuthDelegationClient;
use crate::error::{AppError, AppResult};
use crate::health;
use crate::middleware::request_logging;

/// Gateway router state
pub struct GatewayState {
    pub routes: RouteTable,
    pub service_client: ServiceClient,
    pub auth: Arc<AuthDelegationClient>,
    pub cors: Arc<CorsPolicy>,
}

/// Route request to the owning backend service
pub async fn route_request(
    State(state): State<Arc<GatewayState>>,
    mut request: Request<Body>,
) -> AppResult<Response<Body>> {
    let raw_path = request.uri().path();
    let Some(path) = normalize_path(raw_path) else {
        tracing::debug!(path = %raw_path, "Rejected request path");
        return Err(AppError::validation("invalid request path"));
    };

    let Some(route) = state.routes.route(&path) else {
        tracing::debug!(path = %path, "No service for path");
        return Err(AppError::RouteNotFound(path));
    };

    if route.requires_auth {
        let context = state.auth.validate_session(request.headers()).await?;
        tracing::debug!(
            path = %path,
            user_id = context.principal_id,
            "Session verified for protected route"
        );
        request.extensions_mut().insert(context);
    }

    state
        .service_client
        .forward_request(route.target, &path, request)
        .await
}

/// Gateway router builder
pub struct GatewayRouter;

impl GatewayRouter {
    /// Build gateway state from configuration; invalid routing is fatal here
    pub fn create_state(config: &Config) -> anyhow::Result<Arc<GatewayState>> {
        let routes = RouteTable::from_config(&config.gateway)?;
        let service_client =
            ServiceClient::new(config.gateway.service_timeout_secs, &config.gateway.public_url)?;
        let auth = Arc::new(AuthDelegationClient::new(&config.delegation)?);
        let cors = Arc::new(CorsPolicy::new(&config.cors));

        for entry in routes.entries() {
            tracing::info!(
                prefix = %entry.prefix,
                service = %entry.service,
                backend = %entry.base_url(),
                requires_auth = routes.requires_auth(&entry.prefix, entry),
                "Route registered"
            );
        }

        Ok(Arc::new(GatewayState {
            routes,
            service_client,
            auth,
            cors,
        }))
    }

    /// Assemble the gateway's axum router
    pub fn router(state: Arc<GatewayState>) -> Router {
        Router::new()
            .route("/health", get(health::liveness))
            .fallback(route_request)
            .with_state(state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn(request_logging))
                    .layer(middleware::from_fn_with_state(state.cors.clone(), cors_gate)),
            )
    }
}
