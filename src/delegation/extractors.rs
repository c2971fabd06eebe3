// ============================================================================
// Axum Extractors
// ============================================================================
//
// - SessionPrincipal: caller holds a live session
// - AdminPrincipal:   caller holds a live session and is an administrator
//
// Both work in any router whose state exposes `Arc<AuthDelegationClient>`
// through `FromRef`. An AuthContext already placed in the request extensions
// (by the gateway's auth step) is reused; otherwise the extractor performs
// the delegated check itself.
//
// ============================================================================

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::Arc;

use super::{AuthContext, AuthDelegationClient, CheckKind};
use crate::error::AppError;

/// Extractor for the id of an authenticated caller
///
/// Usage:
/// ```rust,ignore
/// async fn handler(SessionPrincipal(ctx): SessionPrincipal) -> impl IntoResponse {
///     let user_id = ctx.principal_id;
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SessionPrincipal(pub AuthContext);

/// Extractor for an authenticated administrator
#[derive(Debug, Clone, Copy)]
pub struct AdminPrincipal(pub AuthContext);

async fn resolve<S>(parts: &mut Parts, state: &S, kind: CheckKind) -> Result<AuthContext, AppError>
where
    Arc<AuthDelegationClient>: FromRef<S>,
    S: Send + Sync,
{
    if let Some(existing) = parts.extensions.get::<AuthContext>().copied() {
        if kind == CheckKind::Session || existing.admin {
            return Ok(existing);
        }
    }

    let client = <Arc<AuthDelegationClient> as FromRef<S>>::from_ref(state);
    let context = client.check(&parts.headers, kind).await?;
    parts.extensions.insert(context);
    Ok(context)
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionPrincipal
where
    Arc<AuthDelegationClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state, CheckKind::Session).await.map(SessionPrincipal)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminPrincipal
where
    Arc<AuthDelegationClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state, CheckKind::Admin).await.map(AdminPrincipal)
    }
}
