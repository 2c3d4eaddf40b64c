// Library entries: per-user watch status, progress and rating, with the
// transition rules the tracker enforces against provider metadata.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::models::{provider_status, Anime, LibraryStatus, UserAnime};

/// A library entry joined with its anime metadata
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    #[serde(flatten)]
    pub entry: UserAnime,
    pub anime: Anime,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub watching: i64,
    pub completed: i64,
    pub planned: i64,
    pub dropped: i64,
    pub total: i64,
}

/// Validate a candidate (status, episode) pair against the anime's
/// provider status and declared episode count.
///
/// - Unreleased shows can only be planned.
/// - A show still releasing (or unreleased) cannot be completed.
/// - Watching and completed both require at least one episode seen;
///   completed additionally requires reaching the declared total.
pub fn validate_entry(
    status: LibraryStatus,
    current_episode: i64,
    anime_status: Option<&str>,
    total_episodes: Option<i64>,
) -> AppResult<()> {
    if anime_status == Some(provider_status::NOT_YET_RELEASED) && status != LibraryStatus::Planned {
        return Err(AppError::validation(
            "Unreleased anime can only be added as planned",
        ));
    }

    if status == LibraryStatus::Completed
        && matches!(
            anime_status,
            Some(provider_status::RELEASING) | Some(provider_status::NOT_YET_RELEASED)
        )
    {
        return Err(AppError::validation(
            "Cannot complete an anime that is still airing",
        ));
    }

    if status == LibraryStatus::Watching && current_episode < 1 {
        return Err(AppError::validation(
            "Watching requires at least one episode watched",
        ));
    }

    if status == LibraryStatus::Completed {
        if current_episode < 1 {
            return Err(AppError::validation(
                "Completed requires at least one episode watched",
            ));
        }
        if let Some(total) = total_episodes {
            if current_episode < total {
                return Err(AppError::validation(
                    "Completed requires watching all episodes",
                ));
            }
        }
    }

    Ok(())
}

fn validate_rating(rating: Option<i64>) -> AppResult<()> {
    if let Some(r) = rating {
        if !(1..=5).contains(&r) {
            return Err(AppError::validation("Rating must be between 1 and 5"));
        }
    }
    Ok(())
}

async fn fetch_anime(pool: &SqlitePool, anime_id: i64) -> AppResult<Anime> {
    sqlx::query_as::<_, Anime>("SELECT * FROM anime WHERE id = ?")
        .bind(anime_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Anime not found"))
}

async fn fetch_entry(pool: &SqlitePool, user_id: &str, anime_id: i64) -> AppResult<UserAnime> {
    sqlx::query_as::<_, UserAnime>("SELECT * FROM user_anime WHERE user_id = ? AND anime_id = ?")
        .bind(user_id)
        .bind(anime_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Library entry not found"))
}

/// Log an anime into the user's library (insert or overwrite).
///
/// When the target status is completed and the anime declares a positive
/// episode count, the stored episode is forced to that count; client
/// input is not trusted for that case.
pub async fn log_anime(
    pool: &SqlitePool,
    user_id: &str,
    anime_id: i64,
    status: LibraryStatus,
    episode: Option<i64>,
    rating: Option<i64>,
) -> AppResult<UserAnime> {
    let anime = fetch_anime(pool, anime_id).await?;

    let current_episode = match (status, anime.episodes) {
        (LibraryStatus::Completed, Some(total)) if total > 0 => total,
        _ => episode.unwrap_or(0),
    };
    if current_episode < 0 {
        return Err(AppError::validation("Episode cannot be negative"));
    }

    validate_rating(rating)?;
    validate_entry(
        status,
        current_episode,
        anime.status.as_deref(),
        anime.episodes,
    )?;

    sqlx::query(
        r#"
        INSERT INTO user_anime (user_id, anime_id, status, current_episode, rating)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, anime_id) DO UPDATE SET
            status = excluded.status,
            current_episode = excluded.current_episode,
            rating = excluded.rating,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(user_id)
    .bind(anime_id)
    .bind(status)
    .bind(current_episode)
    .bind(rating)
    .execute(pool)
    .await?;

    fetch_entry(pool, user_id, anime_id).await
}

/// Update episode progress on a watching entry. Accepts an absolute
/// episode or a signed delta; absolute wins when both are given. The
/// stored value never drops below 1.
pub async fn update_progress(
    pool: &SqlitePool,
    user_id: &str,
    anime_id: i64,
    episode: Option<i64>,
    delta: Option<i64>,
) -> AppResult<UserAnime> {
    let entry = fetch_entry(pool, user_id, anime_id).await?;

    if entry.status != LibraryStatus::Watching {
        return Err(AppError::validation(
            "Progress can only be updated while watching",
        ));
    }
    if episode.is_none() && delta.is_none() {
        return Err(AppError::validation("No progress value given"));
    }

    let target = episode.unwrap_or(entry.current_episode + delta.unwrap_or(0));
    let new_episode = target.max(1);

    sqlx::query(
        r#"
        UPDATE user_anime
        SET current_episode = ?, updated_at = CURRENT_TIMESTAMP
        WHERE user_id = ? AND anime_id = ?
        "#,
    )
    .bind(new_episode)
    .bind(user_id)
    .bind(anime_id)
    .execute(pool)
    .await?;

    fetch_entry(pool, user_id, anime_id).await
}

/// Change status and/or rating on an existing entry. Status changes run
/// the full transition validation against the current episode count.
pub async fn update_entry(
    pool: &SqlitePool,
    user_id: &str,
    anime_id: i64,
    status: Option<LibraryStatus>,
    rating: Option<i64>,
) -> AppResult<UserAnime> {
    let entry = fetch_entry(pool, user_id, anime_id).await?;
    let anime = fetch_anime(pool, anime_id).await?;

    validate_rating(rating)?;

    let new_status = status.unwrap_or(entry.status);
    let mut current_episode = entry.current_episode;

    // Completing via status change adopts the declared total, same as
    // logging a completed entry would.
    if new_status == LibraryStatus::Completed {
        if let Some(total) = anime.episodes {
            if total > 0 {
                current_episode = total;
            }
        }
    }

    validate_entry(
        new_status,
        current_episode,
        anime.status.as_deref(),
        anime.episodes,
    )?;

    sqlx::query(
        r#"
        UPDATE user_anime
        SET status = ?, current_episode = ?,
            rating = COALESCE(?, rating),
            updated_at = CURRENT_TIMESTAMP
        WHERE user_id = ? AND anime_id = ?
        "#,
    )
    .bind(new_status)
    .bind(current_episode)
    .bind(rating)
    .bind(user_id)
    .bind(anime_id)
    .execute(pool)
    .await?;

    fetch_entry(pool, user_id, anime_id).await
}

/// Remove an entry; missing entries are a 404
pub async fn remove(pool: &SqlitePool, user_id: &str, anime_id: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM user_anime WHERE user_id = ? AND anime_id = ?")
        .bind(user_id)
        .bind(anime_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Library entry not found"));
    }
    Ok(())
}

/// The user's library, newest activity first, optionally filtered by status
pub async fn get_library(
    pool: &SqlitePool,
    user_id: &str,
    status: Option<LibraryStatus>,
) -> AppResult<Vec<LibraryEntry>> {
    let entries: Vec<UserAnime> = match status {
        Some(s) => {
            sqlx::query_as(
                "SELECT * FROM user_anime WHERE user_id = ? AND status = ? ORDER BY updated_at DESC",
            )
            .bind(user_id)
            .bind(s)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM user_anime WHERE user_id = ? ORDER BY updated_at DESC")
                .bind(user_id)
                .fetch_all(pool)
                .await?
        }
    };

    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let marks = vec!["?"; entries.len()].join(",");
    let sql = format!("SELECT * FROM anime WHERE id IN ({})", marks);
    let mut q = sqlx::query_as::<_, Anime>(&sql);
    for entry in &entries {
        q = q.bind(entry.anime_id);
    }
    let anime_rows = q.fetch_all(pool).await?;
    let mut by_id: HashMap<i64, Anime> = anime_rows.into_iter().map(|a| (a.id, a)).collect();

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            by_id
                .remove(&entry.anime_id)
                .map(|anime| LibraryEntry { entry, anime })
        })
        .collect())
}

/// Per-status entry counts
pub async fn get_stats(pool: &SqlitePool, user_id: &str) -> AppResult<LibraryStats> {
    let rows: Vec<(LibraryStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM user_anime WHERE user_id = ? GROUP BY status")
            .bind(user_id)
            .fetch_all(pool)
            .await?;

    let mut stats = LibraryStats {
        watching: 0,
        completed: 0,
        planned: 0,
        dropped: 0,
        total: 0,
    };
    for (status, count) in rows {
        stats.total += count;
        match status {
            LibraryStatus::Watching => stats.watching = count,
            LibraryStatus::Completed => stats.completed = count,
            LibraryStatus::Planned => stats.planned = count,
            LibraryStatus::Dropped => stats.dropped = count,
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::anime::upsert_anime;
    use crate::services::anilist::AnimeRecord;
    use crate::services::auth::create_user;
    use axum::http::StatusCode;

    fn record(id: i64, status: &str, episodes: Option<i64>) -> AnimeRecord {
        AnimeRecord {
            id,
            title: format!("Anime {}", id),
            alt_title: None,
            description: None,
            episodes,
            status: Some(status.to_string()),
            genres: None,
            cover_image: None,
            banner_image: None,
            year: Some(2020),
            rating: Some(70),
        }
    }

    #[test]
    fn test_unreleased_only_accepts_planned() {
        let unreleased = Some(provider_status::NOT_YET_RELEASED);
        assert!(validate_entry(LibraryStatus::Planned, 0, unreleased, Some(12)).is_ok());
        for status in [
            LibraryStatus::Watching,
            LibraryStatus::Completed,
            LibraryStatus::Dropped,
        ] {
            let err = validate_entry(status, 12, unreleased, Some(12)).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_completed_rejected_while_airing() {
        for airing in [provider_status::RELEASING, provider_status::NOT_YET_RELEASED] {
            let err =
                validate_entry(LibraryStatus::Completed, 12, Some(airing), Some(12)).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(validate_entry(
            LibraryStatus::Completed,
            12,
            Some(provider_status::FINISHED),
            Some(12)
        )
        .is_ok());
    }

    #[test]
    fn test_watching_requires_progress() {
        assert!(validate_entry(LibraryStatus::Watching, 0, None, None).is_err());
        assert!(validate_entry(LibraryStatus::Watching, 1, None, None).is_ok());
    }

    #[test]
    fn test_completed_requires_full_progress() {
        let finished = Some(provider_status::FINISHED);
        assert!(validate_entry(LibraryStatus::Completed, 0, finished, None).is_err());
        assert!(validate_entry(LibraryStatus::Completed, 11, finished, Some(12)).is_err());
        assert!(validate_entry(LibraryStatus::Completed, 12, finished, Some(12)).is_ok());
        // No declared total: any positive progress completes
        assert!(validate_entry(LibraryStatus::Completed, 1, finished, None).is_ok());
    }

    #[tokio::test]
    async fn test_log_completed_forces_declared_episode_count() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "logger", "password123", false).await.unwrap();
        upsert_anime(&pool, &record(1, provider_status::FINISHED, Some(12)))
            .await
            .unwrap();

        // Client claims episode 3; completed forces 12
        let entry = log_anime(
            &pool,
            &user.id,
            1,
            LibraryStatus::Completed,
            Some(3),
            Some(5),
        )
        .await
        .unwrap();
        assert_eq!(entry.current_episode, 12);
        assert_eq!(entry.rating, Some(5));
    }

    #[tokio::test]
    async fn test_log_is_an_upsert_per_user_anime() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "upserter", "password123", false).await.unwrap();
        upsert_anime(&pool, &record(1, provider_status::RELEASING, Some(24)))
            .await
            .unwrap();

        log_anime(&pool, &user.id, 1, LibraryStatus::Planned, None, None)
            .await
            .unwrap();
        let entry = log_anime(&pool, &user.id, 1, LibraryStatus::Watching, Some(4), None)
            .await
            .unwrap();
        assert_eq!(entry.status, LibraryStatus::Watching);
        assert_eq!(entry.current_episode, 4);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_anime")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_log_rejects_bad_rating() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "rater", "password123", false).await.unwrap();
        upsert_anime(&pool, &record(1, provider_status::FINISHED, Some(12)))
            .await
            .unwrap();

        let err = log_anime(&pool, &user.id, 1, LibraryStatus::Planned, None, Some(6))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_progress_rules() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "watcher", "password123", false).await.unwrap();
        upsert_anime(&pool, &record(1, provider_status::RELEASING, Some(24)))
            .await
            .unwrap();
        upsert_anime(&pool, &record(2, provider_status::FINISHED, Some(12)))
            .await
            .unwrap();

        log_anime(&pool, &user.id, 1, LibraryStatus::Watching, Some(5), None)
            .await
            .unwrap();

        // Delta applies relative to the stored value
        let entry = update_progress(&pool, &user.id, 1, None, Some(2)).await.unwrap();
        assert_eq!(entry.current_episode, 7);

        // Absolute wins over delta
        let entry = update_progress(&pool, &user.id, 1, Some(3), Some(10)).await.unwrap();
        assert_eq!(entry.current_episode, 3);

        // Never stored below 1
        let entry = update_progress(&pool, &user.id, 1, None, Some(-10)).await.unwrap();
        assert_eq!(entry.current_episode, 1);

        // Non-watching entries are rejected outright
        log_anime(&pool, &user.id, 2, LibraryStatus::Planned, None, None)
            .await
            .unwrap();
        let err = update_progress(&pool, &user.id, 2, Some(4), None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_remove_and_stats() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "cleaner", "password123", false).await.unwrap();
        upsert_anime(&pool, &record(1, provider_status::FINISHED, Some(12)))
            .await
            .unwrap();
        upsert_anime(&pool, &record(2, provider_status::RELEASING, None))
            .await
            .unwrap();

        log_anime(&pool, &user.id, 1, LibraryStatus::Completed, None, None)
            .await
            .unwrap();
        log_anime(&pool, &user.id, 2, LibraryStatus::Watching, Some(2), None)
            .await
            .unwrap();

        let stats = get_stats(&pool, &user.id).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.watching, 1);
        assert_eq!(stats.total, 2);

        remove(&pool, &user.id, 1).await.unwrap();
        let err = remove(&pool, &user.id, 1).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let library = get_library(&pool, &user.id, None).await.unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].anime.id, 2);
    }
}
