// ============================================================================
// Configuration
// ============================================================================
//
// All services are configured from environment variables (optionally seeded
// from a `.env` file). Each concern has its own sub-config with a `from_env`
// constructor; unparsable values fall back to the defaults below.
//
// ============================================================================

use anyhow::Result;
use std::collections::BTreeMap;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_RUST_LOG: &str = "info,portal_server=debug,tower_http=info";

const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// One year
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
const DEFAULT_SESSION_COOKIE_NAME: &str = "session_token";

const DEFAULT_AUTH_CHECK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GATEWAY_PUBLIC_URL: &str = "http://localhost:8080";

const DEFAULT_AUTH_SERVICE_URL: &str = "http://auth-service:8082";
const DEFAULT_BLOG_SERVICE_URL: &str = "http://blogs-service:8081";
const DEFAULT_EVENTS_SERVICE_URL: &str = "http://events-service:8083";
const DEFAULT_ATTRACTION_SERVICE_URL: &str = "http://attraction-service:8085";

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:8080", // Web access
    "http://10.0.2.2:8080",  // Android emulator access
    "http://127.0.0.1:8080", // Localhost fallback
];

/// Largest request body the gateway buffers before forwarding (16 MiB).
pub const MAX_PROXY_BODY_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Salt mixed into hashed identifiers (session tokens) before logging
    pub hash_salt: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            hash_salt: std::env::var("LOG_HASH_SALT")
                .unwrap_or_else(|_| "portal-log-salt".to_string()),
        }
    }
}

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            acquire_timeout_secs: env_parse("DB_ACQUIRE_TIMEOUT_SECS", 30),
            idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT_SECS", 600),
        }
    }
}

/// Session issuance settings (auth service)
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Absolute session lifetime in hours
    pub ttl_hours: i64,
    /// Name of the cookie carrying the session token
    pub cookie_name: String,
    /// Append `Secure` to issued cookies (required by browsers for
    /// `SameSite=None` outside of localhost)
    pub cookie_secure: bool,
    /// bcrypt work factor for password hashes
    pub bcrypt_cost: u32,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            ttl_hours: session_ttl_from_env(),
            cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| DEFAULT_SESSION_COOKIE_NAME.to_string()),
            cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            bcrypt_cost: env_parse("BCRYPT_COST", bcrypt::DEFAULT_COST),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            cookie_secure: false,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Settings for the synchronous session check against the auth service
#[derive(Clone, Debug)]
pub struct DelegationConfig {
    /// Base URL of the auth service (e.g. "http://auth-service:8082")
    pub auth_service_url: String,
    /// Cookie that carries the session credential
    pub cookie_name: String,
    /// Upper bound for one validation round trip (milliseconds)
    pub timeout_ms: u64,
}

impl DelegationConfig {
    pub fn from_env() -> Self {
        Self {
            auth_service_url: std::env::var("AUTH_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_AUTH_SERVICE_URL.to_string()),
            cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| DEFAULT_SESSION_COOKIE_NAME.to_string()),
            timeout_ms: env_parse("AUTH_CHECK_TIMEOUT_MS", DEFAULT_AUTH_CHECK_TIMEOUT_MS),
        }
    }
}

/// One backend service as seen by the gateway
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base URL of the service
    pub url: String,
    /// Path prefixes dispatched to this service
    pub paths: Vec<String>,
    /// Whether these paths require a valid session unless overridden
    pub requires_auth: bool,
}

/// Gateway routing and proxy configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Externally visible gateway address, used to rewrite backend redirects
    pub public_url: String,
    /// Timeout for a proxied backend request in seconds
    pub service_timeout_secs: u64,
    /// Static service table keyed by service name
    pub services: BTreeMap<String, ServiceConfig>,
    /// Exact-path overrides of the per-service auth requirement
    pub auth_overrides: BTreeMap<String, bool>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut services = BTreeMap::new();

        services.insert(
            "blog".to_string(),
            ServiceConfig {
                url: std::env::var("BLOG_SERVICE_URL")
                    .unwrap_or_else(|_| DEFAULT_BLOG_SERVICE_URL.to_string()),
                paths: vec!["/blogs".to_string()],
                requires_auth: true,
            },
        );
        services.insert(
            "auth".to_string(),
            ServiceConfig {
                url: std::env::var("AUTH_SERVICE_URL")
                    .unwrap_or_else(|_| DEFAULT_AUTH_SERVICE_URL.to_string()),
                paths: [
                    "/login",
                    "/register",
                    "/logout",
                    "/profile",
                    "/validate-admin",
                    "/validate-session",
                ]
                .iter()
                .map(|p| p.to_string())
                .collect(),
                // Login and registration have to be reachable without a session
                requires_auth: false,
            },
        );
        services.insert(
            "events".to_string(),
            ServiceConfig {
                url: std::env::var("EVENTS_SERVICE_URL")
                    .unwrap_or_else(|_| DEFAULT_EVENTS_SERVICE_URL.to_string()),
                paths: ["/admin/events", "/events", "/uploads/events"]
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
                requires_auth: false,
            },
        );
        services.insert(
            "attractions".to_string(),
            ServiceConfig {
                url: std::env::var("ATTRACTION_SERVICE_URL")
                    .unwrap_or_else(|_| DEFAULT_ATTRACTION_SERVICE_URL.to_string()),
                paths: ["/admin/attractions", "/attractions", "/uploads"]
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
                requires_auth: false,
            },
        );

        let auth_overrides = BTreeMap::from([
            ("/admin/events".to_string(), true),
            ("/admin/attractions".to_string(), true),
        ]);

        Self {
            public_url: std::env::var("GATEWAY_PUBLIC_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_PUBLIC_URL.to_string()),
            service_timeout_secs: env_parse("SERVICE_TIMEOUT_SECS", DEFAULT_SERVICE_TIMEOUT_SECS),
            services,
            auth_overrides,
        }
    }
}

/// Cross-origin browser access policy
#[derive(Clone, Debug)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn from_env() -> Self {
        let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
            Ok(list) => list
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            Err(_) => DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
        };

        Self { allowed_origins }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub rust_log: String,
    /// PostgreSQL URL; only the auth service requires it
    pub database_url: Option<String>,

    // Sub-configurations
    pub logging: LoggingConfig,
    pub db: DbConfig,
    pub session: SessionConfig,
    pub delegation: DelegationConfig,
    pub gateway: GatewayConfig,
    pub cors: CorsConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let port = env_parse("PORT", DEFAULT_PORT);

        Ok(Self {
            port,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| format!("0.0.0.0:{}", port)),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.to_string()),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            logging: LoggingConfig::from_env(),
            db: DbConfig::from_env(),
            session: SessionConfig::from_env(),
            delegation: DelegationConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            cors: CorsConfig::from_env(),
        })
    }
}

/// SESSION_TTL_HOURS outside 1..=MAX_SESSION_TTL_HOURS falls back to the default
fn session_ttl_from_env() -> i64 {
    let ttl_hours = env_parse("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS);
    if (1..=MAX_SESSION_TTL_HOURS).contains(&ttl_hours) {
        return ttl_hours;
    }
    tracing::warn!(
        ttl_hours,
        max = MAX_SESSION_TTL_HOURS,
        default = DEFAULT_SESSION_TTL_HOURS,
        "SESSION_TTL_HOURS out of range, using default"
    );
    DEFAULT_SESSION_TTL_HOURS
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_gateway_defaults_protect_admin_paths_only() {
        std::env::remove_var("BLOG_SERVICE_URL");
        let gateway = GatewayConfig::from_env();

        assert_eq!(gateway.auth_overrides.get("/admin/events"), Some(&true));
        assert_eq!(gateway.auth_overrides.get("/admin/attractions"), Some(&true));
        assert_eq!(gateway.auth_overrides.get("/attractions"), None);
        assert!(gateway.services["blog"].requires_auth);
        assert!(!gateway.services["attractions"].requires_auth);
        assert_eq!(gateway.services["blog"].url, DEFAULT_BLOG_SERVICE_URL);
    }

    #[test]
    #[serial]
    fn test_cors_origins_from_env() {
        std::env::set_var("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,,");
        let cors = CorsConfig::from_env();
        std::env::remove_var("CORS_ALLOWED_ORIGINS");

        assert_eq!(
            cors.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    #[serial]
    fn test_unparsable_numbers_fall_back_to_defaults() {
        std::env::set_var("AUTH_CHECK_TIMEOUT_MS", "soon");
        let delegation = DelegationConfig::from_env();
        std::env::remove_var("AUTH_CHECK_TIMEOUT_MS");

        assert_eq!(delegation.timeout_ms, DEFAULT_AUTH_CHECK_TIMEOUT_MS);
    }

    #[test]
    #[serial]
    fn test_session_ttl_out_of_range_falls_back_to_default() {
        for value in ["0", "-5", "9223372036854775807", "8761"] {
            std::env::set_var("SESSION_TTL_HOURS", value);
            assert_eq!(
                SessionConfig::from_env().ttl_hours,
                DEFAULT_SESSION_TTL_HOURS,
                "{}",
                value
            );
        }

        std::env::set_var("SESSION_TTL_HOURS", "8760");
        assert_eq!(SessionConfig::from_env().ttl_hours, MAX_SESSION_TTL_HOURS);
        std::env::set_var("SESSION_TTL_HOURS", "1");
        assert_eq!(SessionConfig::from_env().ttl_hours, 1);
        std::env::remove_var("SESSION_TTL_HOURS");
    }
}
