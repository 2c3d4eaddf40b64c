// Anime catalog API endpoints
// Browse, search, and the cron-keyed AniList sync triggers

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::Anime;
use crate::services::anilist::{media_to_record, AnimeRecord};
use crate::services::anime::SyncReport;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trending", get(trending))
        .route("/recent", get(recent))
        .route("/search", get(search))
        .route("/search/anilist", get(search_anilist))
        .route("/sync/trending", post(sync_trending))
        .route("/sync/full", post(sync_full))
        .route("/:id", get(get_by_id))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Provider search hit; not yet persisted locally
#[derive(Debug, Serialize)]
pub struct ProviderHit {
    pub id: i64,
    pub title: String,
    pub alt_title: Option<String>,
    pub description: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    pub genres: Vec<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub year: Option<i64>,
    pub rating: Option<i64>,
}

impl From<AnimeRecord> for ProviderHit {
    fn from(record: AnimeRecord) -> Self {
        let genres = record
            .genres
            .as_deref()
            .and_then(|g| serde_json::from_str(g).ok())
            .unwrap_or_default();
        Self {
            id: record.id,
            title: record.title,
            alt_title: record.alt_title,
            description: record.description,
            episodes: record.episodes,
            status: record.status,
            genres,
            cover_image: record.cover_image,
            banner_image: record.banner_image,
            year: record.year,
            rating: record.rating,
        }
    }
}

/// GET /api/anime/trending
async fn trending(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Anime>>> {
    let rows = state.anime.get_trending(&state.db).await?;
    Ok(Json(rows))
}

/// GET /api/anime/recent
async fn recent(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Vec<Anime>>> {
    let rows = state
        .anime
        .get_recent(&state.db, page.limit.unwrap_or(20), page.offset.unwrap_or(0))
        .await?;
    Ok(Json(rows))
}

/// GET /api/anime/search?q=...&limit=...
/// Ranked search over the local catalog
async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Anime>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 50);
    let rows = state.anime.search_local(&state.db, &query.q, limit).await?;
    Ok(Json(rows))
}

/// GET /api/anime/search/anilist?q=...
/// Ad-hoc provider search; served from a 60s cache per query
async fn search_anilist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<ProviderHit>>> {
    if query.q.trim().chars().count() < 2 {
        return Ok(Json(Vec::new()));
    }
    let media = state.anime.anilist.search(&query.q).await?;
    let hits = media
        .iter()
        .map(|m| ProviderHit::from(media_to_record(m)))
        .collect();
    Ok(Json(hits))
}

/// GET /api/anime/:id
async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Anime>> {
    let anime = state.anime.get_anime(&state.db, id).await?;
    Ok(Json(anime))
}

/// The sync endpoints are keyed by the configured cron secret, not a
/// user session. With no secret configured they are disabled.
fn check_cron_secret(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let expected = state
        .config
        .sync
        .cron_secret
        .as_deref()
        .ok_or_else(|| AppError::forbidden("Sync endpoints are disabled"))?;
    let presented = super::bearer_token(headers)
        .ok_or_else(|| AppError::unauthorized("Missing sync secret"))?;
    if presented != expected {
        return Err(AppError::unauthorized("Invalid sync secret"));
    }
    Ok(())
}

/// POST /api/anime/sync/trending
async fn sync_trending(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<SyncReport>> {
    check_cron_secret(&state, &headers)?;
    let report = state.anime.sync_trending(&state.db).await?;
    Ok(Json(report))
}

/// POST /api/anime/sync/full
async fn sync_full(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<SyncReport>> {
    check_cron_secret(&state, &headers)?;
    let report = state.anime.sync_full(&state.db).await?;
    Ok(Json(report))
}
