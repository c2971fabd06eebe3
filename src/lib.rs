pub mod auth_service;
pub mod config;
pub mod db;
pub mod delegation;
pub mod error;
pub mod gateway;
pub mod health;
pub mod middleware;
pub mod session;
pub mod utils;

pub use config::Config;
pub use delegation::{AdminPrincipal, AuthContext, AuthDelegationClient, SessionPrincipal};
pub use error::{AppError, AppResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber (fmt output filtered by `RUST_LOG`)
pub fn init_tracing(rust_log: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
