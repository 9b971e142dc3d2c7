//! Authentication API endpoints
//!
//! - POST /api/auth/login - Sign in, sets the session cookie
//! - POST /api/auth/logout - Close the current session
//! - GET /api/auth/me - Current user

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    client_ip, extract_session_token, ApiError, AppState, AuthenticatedUser, CLEAR_SESSION_COOKIE,
};
use crate::models::{Session, User};
use crate::services::LoginInput;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// Check credentials under the login rate limits and open a session.
/// Shared by the JSON login and the HTML sign-in form.
pub async fn sign_in(
    state: &AppState,
    headers: &HeaderMap,
    username: &str,
    password: &str,
) -> Result<Session, ApiError> {
    let username = username.trim();
    let limiter_key = username.to_lowercase();
    let ip = client_ip(headers);

    if let Some(ip) = ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Sign-in throttled by IP");
            return Err(too_many_attempts());
        }
        state.rate_limiter.record_ip_request(ip).await;
    }
    if state.rate_limiter.is_username_limited(&limiter_key).await {
        tracing::warn!(username = %username, "Sign-in throttled by username");
        return Err(too_many_attempts());
    }

    match state.user_service.login(LoginInput::new(username, password)).await {
        Ok(session) => {
            state.rate_limiter.clear_username_attempts(&limiter_key).await;
            tracing::info!(user_id = session.user_id, "Signed in");
            Ok(session)
        }
        Err(e) => {
            state.rate_limiter.record_failed_attempt(&limiter_key).await;
            Err(e.into())
        }
    }
}

fn too_many_attempts() -> ApiError {
    ApiError::new("RATE_LIMIT", "Слишком много попыток входа, попробуйте позже")
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let session = sign_in(&state, &headers, &body.username, &body.password).await?;
    let user = state
        .user_service
        .get_by_id(session.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Пользователь не найден"))?;

    let cookie = state.session_cookie(&session.id);
    let body = LoginResponse {
        user,
        token: session.id,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, CLEAR_SESSION_COOKIE)],
    )
        .into_response())
}

async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}
