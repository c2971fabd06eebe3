use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::password::{hash_password, verify_password};
use super::AuthServiceContext;
use crate::error::{AppError, AppResult};
use crate::health;
use crate::session::cookie::extract_cookie;
use crate::session::{NewUser, UserProfile};
use crate::utils::log_safe_id;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

fn session_token(ctx: &AuthServiceContext, headers: &HeaderMap) -> Option<String> {
    extract_cookie(headers, &ctx.sessions.config().cookie_name)
}

/// GET /health
pub async fn health(State(ctx): State<Arc<AuthServiceContext>>) -> Response {
    health::readiness(ctx.sessions.sessions().as_ref()).await
}

/// POST /register
pub async fn register(
    State(ctx): State<Arc<AuthServiceContext>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let request = parse_body(body)?;

    let username = request.username.trim().to_string();
    let email = request.email.trim().to_string();
    if username.is_empty() || email.is_empty() || request.password.is_empty() {
        return Err(AppError::validation("username, email and password are required"));
    }
    if !email.contains('@') {
        return Err(AppError::validation("invalid email address"));
    }

    let password_hash = hash_password(request.password, ctx.sessions.config().bcrypt_cost).await?;

    let created = ctx
        .sessions
        .users()
        .create(&NewUser {
            username,
            email,
            password_hash,
        })
        .await?;

    let Some(user) = created else {
        return Err(AppError::conflict("Username or email already exists"));
    };

    tracing::info!(
        user_id = user.id,
        email_hash = %log_safe_id(&user.email, &ctx.logging.hash_salt),
        "User registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": UserProfile::from(user),
        })),
    ))
}

/// POST /login
pub async fn login(
    State(ctx): State<Arc<AuthServiceContext>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let request = parse_body(body)?;
    let email = request.email.trim();
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::validation("email and password are required"));
    }

    let Some(user) = ctx.sessions.users().find_by_email(email).await? else {
        tracing::debug!(
            email_hash = %log_safe_id(email, &ctx.logging.hash_salt),
            "Login for unknown email"
        );
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(request.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = user.id, "Login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let issued = ctx.sessions.create_session(user.id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, issued.cookie)],
        Json(json!({
            "message": "Login successful",
            "user_id": user.id,
        })),
    ))
}

/// POST /logout (and legacy POST /profile)
///
/// Always succeeds; a missing or stale cookie still gets the clearing directive.
pub async fn logout(
    State(ctx): State<Arc<AuthServiceContext>>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let token = session_token(&ctx, &headers).unwrap_or_default();
    let clearing = ctx.sessions.destroy_session(&token).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clearing)],
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

/// GET /profile
pub async fn profile(
    State(ctx): State<Arc<AuthServiceContext>>,
    headers: HeaderMap,
) -> AppResult<Json<UserProfile>> {
    let token = session_token(&ctx, &headers)
        .ok_or_else(|| AppError::unauthenticated("no session cookie"))?;

    let user_id = ctx
        .sessions
        .validate_session(&token)
        .await?
        .ok_or_else(|| AppError::unauthenticated("invalid or expired session"))?;

    let user = ctx
        .sessions
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::unauthenticated("session owner no longer exists"))?;

    Ok(Json(UserProfile::from(user)))
}

/// GET /validate-session
pub async fn validate_session(
    State(ctx): State<Arc<AuthServiceContext>>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let token = session_token(&ctx, &headers)
        .ok_or_else(|| AppError::unauthenticated("no session cookie"))?;

    let user_id = ctx
        .sessions
        .validate_session(&token)
        .await?
        .ok_or_else(|| AppError::unauthenticated("invalid or expired session"))?;

    Ok(Json(json!({ "user_id": user_id })))
}

/// GET /validate-admin
pub async fn validate_admin(
    State(ctx): State<Arc<AuthServiceContext>>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let token = session_token(&ctx, &headers)
        .ok_or_else(|| AppError::unauthenticated("no session cookie"))?;

    let admin_id = ctx
        .sessions
        .validate_admin(&token)
        .await?
        .ok_or_else(|| AppError::unauthenticated("not an admin session"))?;

    Ok(Json(json!({ "admin_id": admin_id })))
}
