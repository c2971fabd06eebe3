// ============================================================================
// CORS Gate
// ============================================================================
//
// Browser frontends on an allow-listed origin may call the gateway with
// credentials (the session cookie). For such callers the origin is echoed
// back; `*` is never used because it is incompatible with credentials.
// Preflight (OPTIONS) requests are answered here and never routed.
//
// ============================================================================

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::CorsConfig;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS, PUT, DELETE, PATCH";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";
const EXPOSE_HEADERS: &str = "Set-Cookie";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: HashSet<String>,
}

impl CorsPolicy {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.iter().cloned().collect(),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.contains(origin)
    }

    /// Add the CORS headers for a request carrying `origin`
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if let Some(origin) = origin {
            if origin.to_str().map(|o| self.is_allowed(o)).unwrap_or(false) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            }
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));

        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSE_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

/// CORS middleware; short-circuits preflight requests with 200
pub async fn cors_gate(State(policy): State<Arc<CorsPolicy>>, req: Request, next: Next) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();

    if origin.as_ref().is_some_and(|o| {
        o.to_str().map(|o| !policy.is_allowed(o)).unwrap_or(true)
    }) {
        tracing::debug!(origin = ?origin, "Origin not in CORS allow-list");
    }

    let mut response = if req.method() == Method::OPTIONS {
        let mut preflight = Response::new(Body::empty());
        *preflight.status_mut() = StatusCode::OK;
        preflight
    } else {
        next.run(req).await
    };

    policy.apply(origin.as_ref(), response.headers_mut());
    response
}
