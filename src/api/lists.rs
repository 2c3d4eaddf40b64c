// List API endpoints
// User-curated collections and their entries

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{ListEntry, UserList};
use crate::services::lists::{self, EntryWithAnime, ListSummary};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_list))
        .route("/", get(my_lists))
        .route("/:id", get(get_list))
        .route("/:id", patch(update_list))
        .route("/:id", delete(delete_list))
        .route("/:id/entries", post(add_entry))
        .route("/:id/entries/:animeId", patch(update_entry))
        .route("/:id/entries/:animeId", delete(remove_entry))
}

#[derive(Debug, Deserialize)]
pub struct CreateListRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateListRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRequest {
    pub anime_id: i64,
    pub episode: Option<i64>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntryUpdateRequest {
    pub episode: Option<i64>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListDetail {
    #[serde(flatten)]
    pub list: UserList,
    pub entries: Vec<EntryWithAnime>,
}

/// POST /api/lists
async fn create_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateListRequest>,
) -> AppResult<Json<UserList>> {
    let user = super::require_user(&state, &headers).await?;
    let list = lists::create_list(&state.db, &user, &req.name, req.description).await?;
    Ok(Json(list))
}

/// GET /api/lists
/// The caller's own lists with entry counts
async fn my_lists(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<ListSummary>>> {
    let user = super::require_user(&state, &headers).await?;
    let summaries = lists::get_lists(&state.db, &user.id).await?;
    Ok(Json(summaries))
}

/// GET /api/lists/:id
/// List plus entries, gated on the owner's profile visibility
async fn get_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> AppResult<Json<ListDetail>> {
    let viewer = super::optional_user(&state, &headers).await?;
    let list = lists::get_list(&state.db, viewer.as_ref(), &list_id).await?;
    let entries = lists::get_entries(&state.db, viewer.as_ref(), &list_id).await?;
    Ok(Json(ListDetail { list, entries }))
}

/// PATCH /api/lists/:id
async fn update_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
    Json(req): Json<UpdateListRequest>,
) -> AppResult<Json<UserList>> {
    let user = super::require_user(&state, &headers).await?;
    let list = lists::update_list(&state.db, &user, &list_id, req.name, req.description).await?;
    Ok(Json(list))
}

/// DELETE /api/lists/:id
async fn delete_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user = super::require_user(&state, &headers).await?;
    lists::delete_list(&state.db, &user, &list_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/lists/:id/entries
async fn add_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(list_id): Path<String>,
    Json(req): Json<EntryRequest>,
) -> AppResult<Json<ListEntry>> {
    let user = super::require_user(&state, &headers).await?;
    let entry = lists::add_entry(
        &state.db,
        &user,
        &list_id,
        req.anime_id,
        req.episode,
        req.rating,
        req.notes,
    )
    .await?;
    Ok(Json(entry))
}

/// PATCH /api/lists/:id/entries/:animeId
async fn update_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((list_id, anime_id)): Path<(String, i64)>,
    Json(req): Json<EntryUpdateRequest>,
) -> AppResult<Json<ListEntry>> {
    let user = super::require_user(&state, &headers).await?;
    let entry = lists::update_entry(
        &state.db,
        &user,
        &list_id,
        anime_id,
        req.episode,
        req.rating,
        req.notes,
    )
    .await?;
    Ok(Json(entry))
}

/// DELETE /api/lists/:id/entries/:animeId
async fn remove_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((list_id, anime_id)): Path<(String, i64)>,
) -> AppResult<Json<serde_json::Value>> {
    let user = super::require_user(&state, &headers).await?;
    lists::remove_entry(&state.db, &user, &list_id, anime_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
