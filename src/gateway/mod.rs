// ============================================================================
// API Gateway
// ============================================================================
//
// Single entry point for all client requests.
// It handles:
// - CORS for the browser frontends
// - Longest-prefix routing to backend services
// - Delegated session checks for protected paths
// - Reverse proxying with redirect rewriting
//
// Stateless apart from its immutable route table; backends are static.
//
// ============================================================================

pub mod cors;
pub mod router;
pub mod routes;
pub mod service_client;

pub use cors::CorsPolicy;
pub use router::{GatewayRouter, GatewayState};
pub use routes::{normalize_path, RouteConfigError, RouteTable, RouteTarget};
pub use service_client::ServiceClient;
