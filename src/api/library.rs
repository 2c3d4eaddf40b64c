// Library API endpoints
// The caller's own tracking records: log, progress, archive search

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{LibraryStatus, UserAnime};
use crate::services::anime::ArchiveSearchResult;
use crate::services::library::{self, LibraryEntry, LibraryStats};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_library))
        .route("/log", post(log_anime))
        .route("/search", get(archive_search))
        .route("/stats", get(stats))
        .route("/:animeId", patch(update_entry))
        .route("/:animeId", delete(remove_entry))
        .route("/:animeId/progress", post(update_progress))
}

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    pub status: Option<LibraryStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    pub anime_id: i64,
    pub status: LibraryStatus,
    pub episode: Option<i64>,
    pub rating: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub status: Option<LibraryStatus>,
    pub rating: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub episode: Option<i64>,
    pub delta: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveSearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

/// GET /api/library?status=watching
async fn get_library(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LibraryQuery>,
) -> AppResult<Json<Vec<LibraryEntry>>> {
    let user = super::require_user(&state, &headers).await?;
    let entries = library::get_library(&state.db, &user.id, query.status).await?;
    Ok(Json(entries))
}

/// POST /api/library/log
/// Insert or overwrite the caller's record for one anime
async fn log_anime(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LogRequest>,
) -> AppResult<Json<UserAnime>> {
    let user = super::require_user(&state, &headers).await?;
    let entry = library::log_anime(
        &state.db,
        &user.id,
        req.anime_id,
        req.status,
        req.episode,
        req.rating,
    )
    .await?;
    Ok(Json(entry))
}

/// PATCH /api/library/:animeId
async fn update_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(anime_id): Path<i64>,
    Json(req): Json<UpdateRequest>,
) -> AppResult<Json<UserAnime>> {
    let user = super::require_user(&state, &headers).await?;
    let entry =
        library::update_entry(&state.db, &user.id, anime_id, req.status, req.rating).await?;
    Ok(Json(entry))
}

/// POST /api/library/:animeId/progress
/// Absolute episode or signed delta; absolute wins when both are sent
async fn update_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(anime_id): Path<i64>,
    Json(req): Json<ProgressRequest>,
) -> AppResult<Json<UserAnime>> {
    let user = super::require_user(&state, &headers).await?;
    let entry =
        library::update_progress(&state.db, &user.id, anime_id, req.episode, req.delta).await?;
    Ok(Json(entry))
}

/// DELETE /api/library/:animeId
async fn remove_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(anime_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    let user = super::require_user(&state, &headers).await?;
    library::remove(&state.db, &user.id, anime_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /api/library/search?q=...
/// Library hits first, then the rest of the catalog
async fn archive_search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ArchiveSearchQuery>,
) -> AppResult<Json<ArchiveSearchResult>> {
    let user = super::require_user(&state, &headers).await?;
    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let result = state
        .anime
        .archive_search(&state.db, &user.id, &query.q, limit)
        .await?;
    Ok(Json((*result).clone()))
}

/// GET /api/library/stats
async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<LibraryStats>> {
    let user = super::require_user(&state, &headers).await?;
    let stats = library::get_stats(&state.db, &user.id).await?;
    Ok(Json(stats))
}
