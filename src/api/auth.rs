// Auth API endpoints
// Registration, login/logout and the current-user lookup

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::User;
use crate::services::auth;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: String,
    pub user: User,
}

/// POST /api/auth/register
/// Create an account, then log it straight in
async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> AppResult<Json<AuthResponse>> {
    auth::create_user(&state.db, &req.username, &req.password, false).await?;

    let (user, session) = auth::authenticate(
        &state.db,
        &req.username,
        &req.password,
        state.config.auth.session_ttl_hours,
    )
    .await?;

    Ok(Json(AuthResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    }))
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, session) = auth::authenticate(
        &state.db,
        &req.username,
        &req.password,
        state.config.auth.session_ttl_hours,
    )
    .await?;

    Ok(Json(AuthResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    }))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    if let Some(token) = super::bearer_token(&headers) {
        auth::logout(&state.db, &token).await?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /api/auth/me
async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Json<User>> {
    let user = super::require_user(&state, &headers).await?;
    Ok(Json(user))
}
