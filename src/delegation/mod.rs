// ============================================================================
// Auth Delegation Client
// ============================================================================
//
// Services that hold no session state of their own (the gateway, the resource
// services) ask the auth service whether the caller's cookie names a live
// session:
//
//   GET {AUTH_SERVICE_URL}/validate-session  -> 200 {"user_id": n}
//   GET {AUTH_SERVICE_URL}/validate-admin    -> 200 {"admin_id": n}
//
// The inbound Cookie header is forwarded verbatim. Exactly one attempt is
// made, bounded by AUTH_CHECK_TIMEOUT_MS; every failure is "unauthenticated".
//
// ============================================================================

pub mod extractors;

use axum::http::{header, HeaderMap, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::DelegationConfig;
use crate::error::AppError;
use crate::session::cookie::extract_cookie;

pub use extractors::{AdminPrincipal, SessionPrincipal};

/// Verified identity of the caller, valid for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub principal_id: i64,
    pub admin: bool,
}

/// Which question is asked of the auth service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Session,
    Admin,
}

impl CheckKind {
    fn path(self) -> &'static str {
        match self {
            CheckKind::Session => "/validate-session",
            CheckKind::Admin => "/validate-admin",
        }
    }
}

/// Why a delegated check did not produce an AuthContext.
///
/// The variants exist for logs; callers map all of them to 401.
#[derive(Error, Debug)]
pub enum DelegationError {
    #[error("no session cookie on request")]
    MissingCredential,

    #[error("auth service rejected the session (status {0})")]
    Rejected(u16),

    #[error("auth service did not answer in time")]
    Timeout,

    #[error("auth service unreachable: {0}")]
    Transport(String),

    #[error("malformed auth service response: {0}")]
    MalformedResponse(String),
}

impl From<DelegationError> for AppError {
    fn from(err: DelegationError) -> Self {
        AppError::unauthenticated(err.to_string())
    }
}

#[derive(Deserialize)]
struct SessionCheckBody {
    user_id: i64,
}

#[derive(Deserialize)]
struct AdminCheckBody {
    admin_id: i64,
}

pub struct AuthDelegationClient {
    client: reqwest::Client,
    base_url: String,
    cookie_name: String,
}

impl AuthDelegationClient {
    pub fn new(config: &DelegationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: config.auth_service_url.trim_end_matches('/').to_string(),
            cookie_name: config.cookie_name.clone(),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Resolve the caller's session into an AuthContext
    pub async fn validate_session(&self, headers: &HeaderMap) -> Result<AuthContext, DelegationError> {
        self.check(headers, CheckKind::Session).await
    }

    /// Resolve the caller's session into an admin AuthContext
    pub async fn validate_admin(&self, headers: &HeaderMap) -> Result<AuthContext, DelegationError> {
        self.check(headers, CheckKind::Admin).await
    }

    pub async fn check(
        &self,
        headers: &HeaderMap,
        kind: CheckKind,
    ) -> Result<AuthContext, DelegationError> {
        if extract_cookie(headers, &self.cookie_name).is_none() {
            return Err(DelegationError::MissingCredential);
        }

        let url = format!("{}{}", self.base_url, kind.path());
        let mut request = self.client.get(&url);
        for value in headers.get_all(header::COOKIE) {
            request = request.header(header::COOKIE, value.clone());
        }

        let response = request.send().await.map_err(|e| {
            let err = if e.is_timeout() {
                DelegationError::Timeout
            } else {
                DelegationError::Transport(e.to_string())
            };
            tracing::error!(url = %url, error = %err, "Delegated auth check failed");
            err
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(url = %url, status = status.as_u16(), "Delegated auth check rejected");
            return Err(DelegationError::Rejected(status.as_u16()));
        }

        let context = match kind {
            CheckKind::Session => response
                .json::<SessionCheckBody>()
                .await
                .map(|body| AuthContext {
                    principal_id: body.user_id,
                    admin: false,
                }),
            CheckKind::Admin => response
                .json::<AdminCheckBody>()
                .await
                .map(|body| AuthContext {
                    principal_id: body.admin_id,
                    admin: true,
                }),
        }
        .map_err(|e| {
            let err = if e.is_timeout() {
                DelegationError::Timeout
            } else {
                DelegationError::MalformedResponse(e.to_string())
            };
            tracing::warn!(url = %url, error = %err, "Delegated auth check returned an unusable body");
            err
        })?;

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(url: &str) -> AuthDelegationClient {
        AuthDelegationClient::new(&DelegationConfig {
            auth_service_url: url.to_string(),
            cookie_name: "session_token".to_string(),
            timeout_ms: 200,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_cookie_never_calls_out() {
        // Unroutable address: a remote call would fail with Transport instead
        let client = client_for("http://192.0.2.1:9");
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark".parse().unwrap());

        let err = client.validate_session(&headers).await.unwrap_err();
        assert!(matches!(err, DelegationError::MissingCredential));
    }

    #[tokio::test]
    async fn test_unreachable_auth_service_is_unauthenticated() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "session_token=abc".parse().unwrap());

        let err = client.validate_admin(&headers).await.unwrap_err();
        assert!(matches!(
            err,
            DelegationError::Transport(_) | DelegationError::Timeout
        ));
        assert_eq!(AppError::from(err).status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = client_for("http://auth-service:8082/");
        assert_eq!(client.base_url, "http://auth-service:8082");
    }
}
