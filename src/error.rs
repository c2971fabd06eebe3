use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Message returned for every unauthenticated outcome. Absent, unknown,
/// expired and non-admin credentials all produce it.
pub const UNAUTHENTICATED_MESSAGE: &str = "Unauthorized";

/// Application error type shared by the gateway and the auth service
///
/// Each variant maps to one HTTP status and one stable `error_code`; the
/// response body is always `{"error", "error_code", "status"}`.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Request Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No route for path: {0}")]
    RouteNotFound(String),

    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    // ===== Authentication Errors =====
    /// Cause is kept for logs only; clients always see the same message
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    // ===== Upstream Errors =====
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    // ===== Internal Errors =====
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::RouteNotFound(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Validation error: {}", msg),
            AppError::RouteNotFound(_) => "Service not found".to_string(),
            AppError::PayloadTooLarge { .. } => "Request body too large".to_string(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Unauthenticated(_) => UNAUTHENTICATED_MESSAGE.to_string(),
            AppError::InvalidCredentials => "Invalid credentials".to_string(),
            AppError::UpstreamUnavailable(_) => "Service unavailable".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unauthenticated(_) | AppError::InvalidCredentials => "AUTH_ERROR",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authentication failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        // Server errors never expose internal details
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            "Internal server error".to_string()
        } else {
            self.user_message()
        };

        let body = json!({
            "error": message,
            "error_code": error_code,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    /// Create an unauthenticated error; `cause` is only logged
    pub fn unauthenticated(cause: impl Into<String>) -> Self {
        AppError::Unauthenticated(cause.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    /// Create an upstream-unavailable error
    pub fn upstream(msg: impl Into<String>) -> Self {
        AppError::UpstreamUnavailable(msg.into())
    }

    /// Create an internal server error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
