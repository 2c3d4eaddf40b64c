use axum::http::HeaderMap;
use axum::Router;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::services::auth as auth_service;
use crate::AppState;

mod admin;
mod anime;
mod auth;
mod hero;
mod library;
mod lists;
mod users;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/auth", auth::routes())
        .nest("/api/anime", anime::routes())
        .nest("/api/library", library::routes())
        .nest("/api/users", users::routes())
        .nest("/api/lists", lists::routes())
        .nest("/api/hero", hero::routes())
        .nest("/api/admin", admin::routes())
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve the calling user from the session token; 401 without one
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::unauthorized("Missing session token"))?;
    auth_service::validate_session(&state.db, &token).await
}

/// Resolve the calling user if a token is present. No token means an
/// anonymous caller; a bad token is still a 401.
pub async fn optional_user(state: &AppState, headers: &HeaderMap) -> AppResult<Option<User>> {
    match bearer_token(headers) {
        Some(token) => Ok(Some(
            auth_service::validate_session(&state.db, &token).await?,
        )),
        None => Ok(None),
    }
}

/// Like require_user, but the caller must be an admin
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let user = require_user(state, headers).await?;
    if !user.is_admin {
        return Err(AppError::forbidden("Admin access required"));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc-123"));
        assert_eq!(bearer_token(&headers), Some("abc-123".to_string()));

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }
}
