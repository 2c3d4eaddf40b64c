// User API endpoints
// Profiles, follow graph, and public library views

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::UserProfile;
use crate::services::library::{self, LibraryEntry};
use crate::services::lists::{self, ListSummary};
use crate::services::users::{self, FollowListing, ProfileView};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", put(update_profile))
        .route("/:id/profile", get(get_profile))
        .route("/:id/library", get(get_user_library))
        .route("/:id/lists", get(get_user_lists))
        .route("/:id/follow", post(follow))
        .route("/:id/follow", delete(unfollow))
        .route("/:id/followers", get(followers))
        .route("/:id/following", get(following))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub is_public: Option<bool>,
}

/// GET /api/users/:id/profile
async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<ProfileView>> {
    let viewer = super::optional_user(&state, &headers).await?;
    let view = users::get_profile(&state.db, viewer.as_ref(), &user_id).await?;
    Ok(Json(view))
}

/// PUT /api/users/profile
/// Create or update the caller's own profile
async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    let user = super::require_user(&state, &headers).await?;
    let profile = users::upsert_profile(
        &state.db,
        &user.id,
        req.display_name,
        req.bio,
        req.website,
        req.is_public,
    )
    .await?;
    Ok(Json(profile))
}

/// GET /api/users/:id/library
/// Another user's library, gated on profile visibility
async fn get_user_library(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<LibraryEntry>>> {
    let viewer = super::optional_user(&state, &headers).await?;
    if !users::can_view(&state.db, viewer.as_ref(), &user_id).await? {
        return Err(AppError::forbidden("This profile is private"));
    }
    let entries = library::get_library(&state.db, &user_id, None).await?;
    Ok(Json(entries))
}

/// GET /api/users/:id/lists
async fn get_user_lists(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<ListSummary>>> {
    let viewer = super::optional_user(&state, &headers).await?;
    if !users::can_view(&state.db, viewer.as_ref(), &user_id).await? {
        return Err(AppError::forbidden("This profile is private"));
    }
    let summaries = lists::get_lists(&state.db, &user_id).await?;
    Ok(Json(summaries))
}

/// POST /api/users/:id/follow
async fn follow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user = super::require_user(&state, &headers).await?;
    users::follow(&state.db, &user, &user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// DELETE /api/users/:id/follow
async fn unfollow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user = super::require_user(&state, &headers).await?;
    users::unfollow(&state.db, &user, &user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /api/users/:id/followers
async fn followers(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<FollowListing>>> {
    let rows = users::followers(&state.db, &user_id).await?;
    Ok(Json(rows))
}

/// GET /api/users/:id/following
async fn following(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<FollowListing>>> {
    let rows = users::following(&state.db, &user_id).await?;
    Ok(Json(rows))
}
