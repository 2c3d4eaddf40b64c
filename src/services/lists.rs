// User-curated anime lists and their entries.

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Anime, ListEntry, User, UserList};
use crate::services::users;

/// List summary with its entry count
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ListSummary {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub entry_count: i64,
}

/// A list entry joined with its anime metadata
#[derive(Debug, Clone, Serialize)]
pub struct EntryWithAnime {
    #[serde(flatten)]
    pub entry: ListEntry,
    pub anime: Anime,
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::validation("List name must be 1-100 characters"));
    }
    Ok(name)
}

fn validate_rating(rating: Option<i64>) -> AppResult<()> {
    if let Some(r) = rating {
        if !(1..=5).contains(&r) {
            return Err(AppError::validation("Rating must be between 1 and 5"));
        }
    }
    Ok(())
}

async fn fetch_list(pool: &SqlitePool, list_id: &str) -> AppResult<UserList> {
    sqlx::query_as::<_, UserList>("SELECT * FROM user_lists WHERE id = ?")
        .bind(list_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))
}

/// Fetch a list the caller is allowed to read: the owner's lists, or any
/// list whose owner has a public profile.
pub async fn get_list(
    pool: &SqlitePool,
    viewer: Option<&User>,
    list_id: &str,
) -> AppResult<UserList> {
    let list = fetch_list(pool, list_id).await?;
    if !users::can_view(pool, viewer, &list.user_id).await? {
        return Err(AppError::forbidden("This list is private"));
    }
    Ok(list)
}

/// Fetch a list only if the caller owns it
async fn fetch_owned_list(pool: &SqlitePool, owner: &User, list_id: &str) -> AppResult<UserList> {
    let list = fetch_list(pool, list_id).await?;
    if list.user_id != owner.id {
        return Err(AppError::forbidden("Not your list"));
    }
    Ok(list)
}

pub async fn create_list(
    pool: &SqlitePool,
    owner: &User,
    name: &str,
    description: Option<String>,
) -> AppResult<UserList> {
    let name = validate_name(name)?;
    let id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO user_lists (id, user_id, name, description) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&owner.id)
        .bind(name)
        .bind(&description)
        .execute(pool)
        .await?;

    fetch_list(pool, &id).await
}

/// All lists owned by a user, with entry counts
pub async fn get_lists(pool: &SqlitePool, owner_id: &str) -> AppResult<Vec<ListSummary>> {
    let rows = sqlx::query_as::<_, ListSummary>(
        r#"
        SELECT l.*, COUNT(e.anime_id) AS entry_count
        FROM user_lists l
        LEFT JOIN list_entries e ON e.list_id = l.id
        WHERE l.user_id = ?
        GROUP BY l.id
        ORDER BY l.updated_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn update_list(
    pool: &SqlitePool,
    owner: &User,
    list_id: &str,
    name: Option<String>,
    description: Option<String>,
) -> AppResult<UserList> {
    fetch_owned_list(pool, owner, list_id).await?;

    let name = match name {
        Some(n) => Some(validate_name(&n)?.to_string()),
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE user_lists
        SET name = COALESCE(?, name),
            description = COALESCE(?, description),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(list_id)
    .execute(pool)
    .await?;

    fetch_list(pool, list_id).await
}

pub async fn delete_list(pool: &SqlitePool, owner: &User, list_id: &str) -> AppResult<()> {
    fetch_owned_list(pool, owner, list_id).await?;
    sqlx::query("DELETE FROM user_lists WHERE id = ?")
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Add an anime to a list. Duplicate entries conflict.
pub async fn add_entry(
    pool: &SqlitePool,
    owner: &User,
    list_id: &str,
    anime_id: i64,
    episode: Option<i64>,
    rating: Option<i64>,
    notes: Option<String>,
) -> AppResult<ListEntry> {
    fetch_owned_list(pool, owner, list_id).await?;
    validate_rating(rating)?;

    let anime_exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM anime WHERE id = ?")
        .bind(anime_id)
        .fetch_optional(pool)
        .await?;
    if anime_exists.is_none() {
        return Err(AppError::not_found("Anime not found"));
    }

    let duplicate: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM list_entries WHERE list_id = ? AND anime_id = ?")
            .bind(list_id)
            .bind(anime_id)
            .fetch_optional(pool)
            .await?;
    if duplicate.is_some() {
        return Err(AppError::conflict("Anime already on this list"));
    }

    sqlx::query(
        "INSERT INTO list_entries (list_id, anime_id, episode, rating, notes) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(list_id)
    .bind(anime_id)
    .bind(episode)
    .bind(rating)
    .bind(&notes)
    .execute(pool)
    .await?;

    touch_list(pool, list_id).await?;

    let entry = sqlx::query_as::<_, ListEntry>(
        "SELECT * FROM list_entries WHERE list_id = ? AND anime_id = ?",
    )
    .bind(list_id)
    .bind(anime_id)
    .fetch_one(pool)
    .await?;
    Ok(entry)
}

pub async fn update_entry(
    pool: &SqlitePool,
    owner: &User,
    list_id: &str,
    anime_id: i64,
    episode: Option<i64>,
    rating: Option<i64>,
    notes: Option<String>,
) -> AppResult<ListEntry> {
    fetch_owned_list(pool, owner, list_id).await?;
    validate_rating(rating)?;

    let result = sqlx::query(
        r#"
        UPDATE list_entries
        SET episode = COALESCE(?, episode),
            rating = COALESCE(?, rating),
            notes = COALESCE(?, notes)
        WHERE list_id = ? AND anime_id = ?
        "#,
    )
    .bind(episode)
    .bind(rating)
    .bind(&notes)
    .bind(list_id)
    .bind(anime_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("List entry not found"));
    }

    touch_list(pool, list_id).await?;

    let entry = sqlx::query_as::<_, ListEntry>(
        "SELECT * FROM list_entries WHERE list_id = ? AND anime_id = ?",
    )
    .bind(list_id)
    .bind(anime_id)
    .fetch_one(pool)
    .await?;
    Ok(entry)
}

pub async fn remove_entry(
    pool: &SqlitePool,
    owner: &User,
    list_id: &str,
    anime_id: i64,
) -> AppResult<()> {
    fetch_owned_list(pool, owner, list_id).await?;

    let result = sqlx::query("DELETE FROM list_entries WHERE list_id = ? AND anime_id = ?")
        .bind(list_id)
        .bind(anime_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("List entry not found"));
    }

    touch_list(pool, list_id).await
}

/// Entries of a readable list, joined with anime metadata
pub async fn get_entries(
    pool: &SqlitePool,
    viewer: Option<&User>,
    list_id: &str,
) -> AppResult<Vec<EntryWithAnime>> {
    get_list(pool, viewer, list_id).await?;

    let entries: Vec<ListEntry> =
        sqlx::query_as("SELECT * FROM list_entries WHERE list_id = ? ORDER BY created_at ASC, rowid ASC")
            .bind(list_id)
            .fetch_all(pool)
            .await?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let anime = sqlx::query_as::<_, Anime>("SELECT * FROM anime WHERE id = ?")
            .bind(entry.anime_id)
            .fetch_optional(pool)
            .await?;
        if let Some(anime) = anime {
            out.push(EntryWithAnime { entry, anime });
        }
    }
    Ok(out)
}

async fn touch_list(pool: &SqlitePool, list_id: &str) -> AppResult<()> {
    sqlx::query("UPDATE user_lists SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::provider_status;
    use crate::services::anilist::AnimeRecord;
    use crate::services::anime::upsert_anime;
    use crate::services::auth::create_user;
    use axum::http::StatusCode;

    async fn seed_anime(pool: &SqlitePool, id: i64) {
        upsert_anime(
            pool,
            &AnimeRecord {
                id,
                title: format!("Anime {}", id),
                alt_title: None,
                description: None,
                episodes: Some(12),
                status: Some(provider_status::FINISHED.to_string()),
                genres: None,
                cover_image: None,
                banner_image: None,
                year: Some(2020),
                rating: Some(70),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_list_crud_and_ownership() {
        let pool = db::test_pool().await;
        let owner = create_user(&pool, "curator", "password123", false).await.unwrap();
        let other = create_user(&pool, "lurker", "password123", false).await.unwrap();

        let list = create_list(&pool, &owner, "Favorites", Some("The best".into()))
            .await
            .unwrap();

        // Renames by non-owners are forbidden
        let err = update_list(&pool, &other, &list.id, Some("Mine now".into()), None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let renamed = update_list(&pool, &owner, &list.id, Some("Top Tier".into()), None)
            .await
            .unwrap();
        assert_eq!(renamed.name, "Top Tier");

        delete_list(&pool, &owner, &list.id).await.unwrap();
        let err = fetch_list(&pool, &list.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_entries_duplicate_and_counts() {
        let pool = db::test_pool().await;
        let owner = create_user(&pool, "counter", "password123", false).await.unwrap();
        seed_anime(&pool, 100).await;
        seed_anime(&pool, 200).await;

        let list = create_list(&pool, &owner, "Watchlist", None).await.unwrap();

        add_entry(&pool, &owner, &list.id, 100, None, Some(4), None)
            .await
            .unwrap();
        add_entry(&pool, &owner, &list.id, 200, Some(3), None, Some("slow start".into()))
            .await
            .unwrap();

        let err = add_entry(&pool, &owner, &list.id, 100, None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        // Unknown anime is a 404
        let err = add_entry(&pool, &owner, &list.id, 999, None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let summaries = get_lists(&pool, &owner.id).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].entry_count, 2);

        let entries = get_entries(&pool, Some(&owner), &list.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].anime.id, 100);

        remove_entry(&pool, &owner, &list.id, 100).await.unwrap();
        let err = remove_entry(&pool, &owner, &list.id, 100).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_entry_rating_bounds() {
        let pool = db::test_pool().await;
        let owner = create_user(&pool, "bounds", "password123", false).await.unwrap();
        seed_anime(&pool, 1).await;
        let list = create_list(&pool, &owner, "Rated", None).await.unwrap();

        let err = add_entry(&pool, &owner, &list.id, 1, None, Some(0), None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_private_owner_hides_list_from_strangers() {
        let pool = db::test_pool().await;
        let owner = create_user(&pool, "hermit", "password123", false).await.unwrap();
        let other = create_user(&pool, "nosy", "password123", false).await.unwrap();

        crate::services::users::upsert_profile(&pool, &owner.id, None, None, None, Some(false))
            .await
            .unwrap();
        let list = create_list(&pool, &owner, "Secret", None).await.unwrap();

        let err = get_list(&pool, Some(&other), &list.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(get_list(&pool, Some(&owner), &list.id).await.is_ok());
    }
}
