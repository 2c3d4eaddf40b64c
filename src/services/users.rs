// Profiles and the follow graph.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{User, UserProfile};

/// Public view of a user: profile fields plus follow counts
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user_id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub is_public: bool,
    pub followers: i64,
    pub following: i64,
    pub is_following: bool,
}

/// A row in a followers/following listing
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FollowListing {
    pub user_id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub followed_at: String,
}

async fn fetch_user(pool: &SqlitePool, user_id: &str) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

async fn fetch_profile(pool: &SqlitePool, user_id: &str) -> AppResult<Option<UserProfile>> {
    let profile =
        sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(profile)
}

/// Whether `viewer` may see `target`'s non-public content.
/// Owners and admins always can; everyone else needs a public profile.
pub async fn can_view(pool: &SqlitePool, viewer: Option<&User>, target_id: &str) -> AppResult<bool> {
    if let Some(viewer) = viewer {
        if viewer.id == target_id || viewer.is_admin {
            return Ok(true);
        }
    }
    // Missing profile row defaults to public
    let is_public = fetch_profile(pool, target_id)
        .await?
        .map(|p| p.is_public)
        .unwrap_or(true);
    Ok(is_public)
}

/// Fetch a user's profile view. Private profiles are only visible to the
/// owner and admins.
pub async fn get_profile(
    pool: &SqlitePool,
    viewer: Option<&User>,
    target_id: &str,
) -> AppResult<ProfileView> {
    let user = fetch_user(pool, target_id).await?;
    let profile = fetch_profile(pool, target_id).await?;
    let is_public = profile.as_ref().map(|p| p.is_public).unwrap_or(true);

    if !can_view(pool, viewer, target_id).await? {
        return Err(AppError::forbidden("This profile is private"));
    }

    let followers: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM user_follows WHERE following_id = ?")
            .bind(target_id)
            .fetch_one(pool)
            .await?;
    let following: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM user_follows WHERE follower_id = ?")
            .bind(target_id)
            .fetch_one(pool)
            .await?;

    let is_following = match viewer {
        Some(viewer) if viewer.id != target_id => sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM user_follows WHERE follower_id = ? AND following_id = ?",
        )
        .bind(&viewer.id)
        .bind(target_id)
        .fetch_optional(pool)
        .await?
        .is_some(),
        _ => false,
    };

    Ok(ProfileView {
        user_id: user.id,
        name: user.name,
        display_name: profile.as_ref().and_then(|p| p.display_name.clone()),
        bio: profile.as_ref().and_then(|p| p.bio.clone()),
        website: profile.as_ref().and_then(|p| p.website.clone()),
        is_public,
        followers: followers.0,
        following: following.0,
        is_following,
    })
}

/// Create or update the caller's profile
pub async fn upsert_profile(
    pool: &SqlitePool,
    user_id: &str,
    display_name: Option<String>,
    bio: Option<String>,
    website: Option<String>,
    is_public: Option<bool>,
) -> AppResult<UserProfile> {
    if let Some(ref name) = display_name {
        if name.trim().is_empty() || name.chars().count() > 64 {
            return Err(AppError::validation("Display name must be 1-64 characters"));
        }
    }
    if let Some(ref bio) = bio {
        if bio.chars().count() > 500 {
            return Err(AppError::validation("Bio must be at most 500 characters"));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, display_name, bio, website, is_public)
        VALUES (?, ?, ?, ?, COALESCE(?, 1))
        ON CONFLICT(user_id) DO UPDATE SET
            display_name = COALESCE(excluded.display_name, display_name),
            bio = COALESCE(excluded.bio, bio),
            website = COALESCE(excluded.website, website),
            is_public = COALESCE(?, is_public),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(user_id)
    .bind(&display_name)
    .bind(&bio)
    .bind(&website)
    .bind(is_public)
    .bind(is_public)
    .execute(pool)
    .await?;

    let profile = fetch_profile(pool, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Profile upsert produced no row".to_string()))?;
    Ok(profile)
}

/// Follow another user. Self-follows are invalid; duplicates conflict.
pub async fn follow(pool: &SqlitePool, follower: &User, target_id: &str) -> AppResult<()> {
    if follower.id == target_id {
        return Err(AppError::validation("Cannot follow yourself"));
    }
    fetch_user(pool, target_id).await?;

    let existing: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM user_follows WHERE follower_id = ? AND following_id = ?",
    )
    .bind(&follower.id)
    .bind(target_id)
    .fetch_optional(pool)
    .await?;
    if existing.is_some() {
        return Err(AppError::conflict("Already following this user"));
    }

    sqlx::query("INSERT INTO user_follows (follower_id, following_id) VALUES (?, ?)")
        .bind(&follower.id)
        .bind(target_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove a follow edge; absent edges are a 404
pub async fn unfollow(pool: &SqlitePool, follower: &User, target_id: &str) -> AppResult<()> {
    let result =
        sqlx::query("DELETE FROM user_follows WHERE follower_id = ? AND following_id = ?")
            .bind(&follower.id)
            .bind(target_id)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Not following this user"));
    }
    Ok(())
}

/// Users following `target_id`, most recent first
pub async fn followers(pool: &SqlitePool, target_id: &str) -> AppResult<Vec<FollowListing>> {
    fetch_user(pool, target_id).await?;
    let rows = sqlx::query_as::<_, FollowListing>(
        r#"
        SELECT u.id AS user_id, u.name, p.display_name, f.created_at AS followed_at
        FROM user_follows f
        JOIN users u ON u.id = f.follower_id
        LEFT JOIN user_profiles p ON p.user_id = u.id
        WHERE f.following_id = ?
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Users `target_id` follows, most recent first
pub async fn following(pool: &SqlitePool, target_id: &str) -> AppResult<Vec<FollowListing>> {
    fetch_user(pool, target_id).await?;
    let rows = sqlx::query_as::<_, FollowListing>(
        r#"
        SELECT u.id AS user_id, u.name, p.display_name, f.created_at AS followed_at
        FROM user_follows f
        JOIN users u ON u.id = f.following_id
        LEFT JOIN user_profiles p ON p.user_id = u.id
        WHERE f.follower_id = ?
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::auth::create_user;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_follow_unfollow_and_counts() {
        let pool = db::test_pool().await;
        let alice = create_user(&pool, "alice", "password123", false).await.unwrap();
        let bob = create_user(&pool, "bobby", "password123", false).await.unwrap();

        follow(&pool, &alice, &bob.id).await.unwrap();

        // Duplicate follow conflicts
        let err = follow(&pool, &alice, &bob.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        // Self-follow is invalid
        let err = follow(&pool, &alice, &alice.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let view = get_profile(&pool, Some(&alice), &bob.id).await.unwrap();
        assert_eq!(view.followers, 1);
        assert_eq!(view.following, 0);
        assert!(view.is_following);

        let fs = followers(&pool, &bob.id).await.unwrap();
        assert_eq!(fs.len(), 1);
        assert_eq!(fs[0].name, "alice");

        unfollow(&pool, &alice, &bob.id).await.unwrap();
        let err = unfollow(&pool, &alice, &bob.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_private_profile_visibility() {
        let pool = db::test_pool().await;
        let owner = create_user(&pool, "owner", "password123", false).await.unwrap();
        let other = create_user(&pool, "other", "password123", false).await.unwrap();
        let admin = create_user(&pool, "boss", "password123", true).await.unwrap();

        upsert_profile(
            &pool,
            &owner.id,
            Some("Owner".to_string()),
            None,
            None,
            Some(false),
        )
        .await
        .unwrap();

        // Stranger and anonymous are rejected
        let err = get_profile(&pool, Some(&other), &owner.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = get_profile(&pool, None, &owner.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        // Owner and admin still see it
        assert!(get_profile(&pool, Some(&owner), &owner.id).await.is_ok());
        assert!(get_profile(&pool, Some(&admin), &owner.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_upsert_merges_fields() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "merge", "password123", false).await.unwrap();

        upsert_profile(&pool, &user.id, Some("First".into()), None, None, None)
            .await
            .unwrap();
        let profile = upsert_profile(
            &pool,
            &user.id,
            None,
            Some("A bio".into()),
            None,
            Some(false),
        )
        .await
        .unwrap();

        // Earlier display name survives a partial update
        assert_eq!(profile.display_name, Some("First".to_string()));
        assert_eq!(profile.bio, Some("A bio".to_string()));
        assert!(!profile.is_public);
    }
}
