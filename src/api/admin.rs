// Admin API endpoints
// User admin-status management and hero curation

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{HeroVideo, User};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/admin", patch(set_admin))
        .route("/hero", get(list_hero))
        .route("/hero", post(create_hero))
        .route("/hero/:id", patch(update_hero))
        .route("/hero/:id", delete(delete_hero))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHeroRequest {
    pub title: String,
    pub video_url: String,
    pub anime_id: Option<i64>,
    pub sort_order: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHeroRequest {
    pub title: Option<String>,
    pub video_url: Option<String>,
    pub anime_id: Option<i64>,
    pub sort_order: Option<i64>,
    pub enabled: Option<bool>,
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<User>>> {
    super::require_admin(&state, &headers).await?;
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(users))
}

/// PATCH /api/admin/users/:id/admin
async fn set_admin(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<SetAdminRequest>,
) -> AppResult<Json<User>> {
    super::require_admin(&state, &headers).await?;

    let result = sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
        .bind(req.is_admin)
        .bind(&user_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User not found"));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(user))
}

async fn fetch_hero(state: &AppState, id: &str) -> AppResult<HeroVideo> {
    sqlx::query_as::<_, HeroVideo>("SELECT * FROM hero_videos WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Hero video not found"))
}

/// GET /api/admin/hero
/// All hero slots, disabled ones included
async fn list_hero(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<HeroVideo>>> {
    super::require_admin(&state, &headers).await?;
    let rows = sqlx::query_as::<_, HeroVideo>(
        "SELECT * FROM hero_videos ORDER BY sort_order ASC, created_at ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// POST /api/admin/hero
async fn create_hero(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateHeroRequest>,
) -> AppResult<Json<HeroVideo>> {
    super::require_admin(&state, &headers).await?;

    if req.title.trim().is_empty() || req.video_url.trim().is_empty() {
        return Err(AppError::validation("Title and video URL are required"));
    }
    if let Some(anime_id) = req.anime_id {
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM anime WHERE id = ?")
            .bind(anime_id)
            .fetch_optional(&state.db)
            .await?;
        if exists.is_none() {
            return Err(AppError::not_found("Anime not found"));
        }
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO hero_videos (id, title, video_url, anime_id, sort_order, enabled)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(req.title.trim())
    .bind(req.video_url.trim())
    .bind(req.anime_id)
    .bind(req.sort_order.unwrap_or(0))
    .bind(req.enabled.unwrap_or(true))
    .execute(&state.db)
    .await?;

    let hero = fetch_hero(&state, &id).await?;
    Ok(Json(hero))
}

/// PATCH /api/admin/hero/:id
async fn update_hero(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateHeroRequest>,
) -> AppResult<Json<HeroVideo>> {
    super::require_admin(&state, &headers).await?;
    fetch_hero(&state, &id).await?;

    if let Some(ref title) = req.title {
        if title.trim().is_empty() {
            return Err(AppError::validation("Title cannot be empty"));
        }
    }

    sqlx::query(
        r#"
        UPDATE hero_videos
        SET title = COALESCE(?, title),
            video_url = COALESCE(?, video_url),
            anime_id = COALESCE(?, anime_id),
            sort_order = COALESCE(?, sort_order),
            enabled = COALESCE(?, enabled)
        WHERE id = ?
        "#,
    )
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.video_url.as_deref().map(str::trim))
    .bind(req.anime_id)
    .bind(req.sort_order)
    .bind(req.enabled)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let hero = fetch_hero(&state, &id).await?;
    Ok(Json(hero))
}

/// DELETE /api/admin/hero/:id
async fn delete_hero(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    super::require_admin(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM hero_videos WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Hero video not found"));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}
