// Hero curation API endpoints
// Public read side of the admin-managed home page banners

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::HeroVideo;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_hero_videos))
}

/// GET /api/hero
/// Enabled hero slots in curation order
async fn get_hero_videos(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<HeroVideo>>> {
    let rows = sqlx::query_as::<_, HeroVideo>(
        "SELECT * FROM hero_videos WHERE enabled = 1 ORDER BY sort_order ASC, created_at ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}
