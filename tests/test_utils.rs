#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{FromRef, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use portal_server::{
    auth_service::{create_router, AuthServiceContext},
    config::{
        Config, CorsConfig, DbConfig, DelegationConfig, GatewayConfig, LoggingConfig,
        ServiceConfig, SessionConfig,
    },
    gateway::GatewayRouter,
    session::{MemorySessionStore, MemoryUserStore},
    AdminPrincipal, AuthContext, AuthDelegationClient, SessionPrincipal,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const PUBLIC_URL: &str = "http://localhost:8080";
pub const ALLOWED_ORIGIN: &str = "http://10.0.2.2:8080";

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", address)
}

/// Base URL of a port nothing listens on
pub fn unused_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", address)
}

/// HTTP client that never follows redirects or stores cookies
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

// ============================================================================
// Auth service
// ============================================================================

pub struct TestAuth {
    pub address: String,
    pub users: Arc<MemoryUserStore>,
    pub sessions: Arc<MemorySessionStore>,
}

pub async fn spawn_auth_service() -> TestAuth {
    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::new());

    let session_config = SessionConfig {
        bcrypt_cost: 4,
        ..SessionConfig::default()
    };
    let context = Arc::new(AuthServiceContext::new(
        sessions.clone(),
        users.clone(),
        session_config,
        LoggingConfig {
            hash_salt: "test-salt".to_string(),
        },
    ));

    let address = serve(create_router(context)).await;
    TestAuth {
        address,
        users,
        sessions,
    }
}

/// Register and log in; returns `(user_id, "session_token=<token>")`
pub async fn register_and_login(base_url: &str, username: &str) -> (i64, String) {
    let client = client();
    let email = format!("{}@example.com", username);

    let response = client
        .post(format!("{}/register", base_url))
        .json(&json!({ "username": username, "email": email, "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(format!("{}/login", base_url))
        .json(&json!({ "email": email, "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = session_cookie_pair(&response).expect("login must set the session cookie");
    let body: Value = response.json().await.unwrap();
    (body["user_id"].as_i64().unwrap(), cookie)
}

/// `name=value` part of the Set-Cookie header of a response
pub fn session_cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
}

/// Auth service whose validation endpoints answer only after `delay`
pub async fn spawn_slow_auth_service(delay: Duration) -> String {
    let slow = move || async move {
        tokio::time::sleep(delay).await;
        Json(json!({ "user_id": 1 }))
    };
    let app = Router::new()
        .route("/validate-session", get(slow))
        .route("/validate-admin", get(slow));
    serve(app).await
}

// ============================================================================
// Mock backend service
// ============================================================================

#[derive(Clone)]
struct BackendState {
    name: String,
    self_url: Arc<std::sync::OnceLock<String>>,
    auth: Arc<AuthDelegationClient>,
    hits: Arc<AtomicUsize>,
}

impl FromRef<BackendState> for Arc<AuthDelegationClient> {
    fn from_ref(state: &BackendState) -> Self {
        state.auth.clone()
    }
}

pub struct TestBackend {
    pub address: String,
    pub hits: Arc<AtomicUsize>,
}

impl TestBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn count_hits(State(state): State<BackendState>, req: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    next.run(req).await
}

async fn echo(State(state): State<BackendState>, req: Request) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let header_value = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "service": state.name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "host": header_value(header::HOST),
        "cookie": header_value(header::COOKIE),
        "body": String::from_utf8_lossy(&body),
        "auth_context": parts.extensions.get::<AuthContext>().is_some(),
    }))
}

async fn whoami(SessionPrincipal(ctx): SessionPrincipal) -> Json<Value> {
    Json(json!({ "user_id": ctx.principal_id, "admin": ctx.admin }))
}

async fn admin_only(AdminPrincipal(ctx): AdminPrincipal) -> Json<Value> {
    Json(json!({ "admin_id": ctx.principal_id }))
}

async fn redirect_to_self(State(state): State<BackendState>) -> Response {
    let own = state.self_url.get().cloned().unwrap_or_default();
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("{}/events/1?tab=info", own))],
    )
        .into_response()
}

async fn redirect_relative() -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, "/events/2")]).into_response()
}

async fn set_cookie() -> Response {
    (
        [(header::SET_COOKIE, "flavour=oat; Path=/")],
        Body::from("ok"),
    )
        .into_response()
}

/// Backend that echoes what it receives and exposes a few fixed endpoints:
/// - `/blogs/whoami`             (SessionPrincipal)
/// - `/admin/events/check`       (AdminPrincipal)
/// - `/events/redirect-self`     (302 to its own absolute URL)
/// - `/events/redirect-relative` (303 to a relative URL)
/// - `/events/set-cookie`
pub async fn spawn_backend(name: &str, auth_url: &str) -> TestBackend {
    let auth = AuthDelegationClient::new(&DelegationConfig {
        auth_service_url: auth_url.to_string(),
        cookie_name: "session_token".to_string(),
        timeout_ms: 2000,
    })
    .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let state = BackendState {
        name: name.to_string(),
        self_url: Arc::new(std::sync::OnceLock::new()),
        auth: Arc::new(auth),
        hits: hits.clone(),
    };

    let app = Router::new()
        .route("/blogs/whoami", get(whoami))
        .route("/admin/events/check", get(admin_only))
        .route("/events/redirect-self", get(redirect_to_self))
        .route("/events/redirect-relative", get(redirect_relative))
        .route("/events/set-cookie", get(set_cookie))
        .fallback(echo)
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .with_state(state.clone());

    let address = serve(app).await;
    let _ = state.self_url.set(address.clone());

    TestBackend { address, hits }
}

// ============================================================================
// Gateway
// ============================================================================

fn service(url: &str, paths: &[&str], requires_auth: bool) -> ServiceConfig {
    ServiceConfig {
        url: url.to_string(),
        paths: paths.iter().map(|p| p.to_string()).collect(),
        requires_auth,
    }
}

/// Gateway configuration with the production route layout pointed at local
/// test servers
pub fn gateway_config(auth_url: &str, blogs_url: &str, events_url: &str, attractions_url: &str) -> Config {
    let services = BTreeMap::from([
        ("blog".to_string(), service(blogs_url, &["/blogs"], true)),
        (
            "auth".to_string(),
            service(
                auth_url,
                &["/login", "/register", "/logout", "/profile", "/validate-admin", "/validate-session"],
                false,
            ),
        ),
        (
            "events".to_string(),
            service(events_url, &["/admin/events", "/events", "/uploads/events"], false),
        ),
        (
            "attractions".to_string(),
            service(attractions_url, &["/admin/attractions", "/attractions", "/uploads"], false),
        ),
    ]);

    Config {
        port: 0,
        bind_address: "127.0.0.1:0".to_string(),
        rust_log: "info".to_string(),
        database_url: None,
        logging: LoggingConfig {
            hash_salt: "test-salt".to_string(),
        },
        db: DbConfig {
            max_connections: 1,
            acquire_timeout_secs: 1,
            idle_timeout_secs: 1,
        },
        session: SessionConfig::default(),
        delegation: DelegationConfig {
            auth_service_url: auth_url.to_string(),
            cookie_name: "session_token".to_string(),
            timeout_ms: 2000,
        },
        gateway: GatewayConfig {
            public_url: PUBLIC_URL.to_string(),
            service_timeout_secs: 5,
            services,
            auth_overrides: BTreeMap::from([
                ("/admin/events".to_string(), true),
                ("/admin/attractions".to_string(), true),
            ]),
        },
        cors: CorsConfig {
            allowed_origins: vec![
                "http://localhost:8080".to_string(),
                ALLOWED_ORIGIN.to_string(),
            ],
        },
    }
}

pub async fn spawn_gateway(config: &Config) -> String {
    let state = GatewayRouter::create_state(config).unwrap();
    serve(GatewayRouter::router(state)).await
}

/// Auth service, three backends and a gateway in front of them
pub struct TestStack {
    pub gateway: String,
    pub auth: TestAuth,
    pub blogs: TestBackend,
    pub events: TestBackend,
    pub attractions: TestBackend,
}

pub async fn spawn_stack() -> TestStack {
    let auth = spawn_auth_service().await;
    let blogs = spawn_backend("blogs", &auth.address).await;
    let events = spawn_backend("events", &auth.address).await;
    let attractions = spawn_backend("attractions", &auth.address).await;

    let config = gateway_config(
        &auth.address,
        &blogs.address,
        &events.address,
        &attractions.address,
    );
    let gateway = spawn_gateway(&config).await;

    TestStack {
        gateway,
        auth,
        blogs,
        events,
        attractions,
    }
}
