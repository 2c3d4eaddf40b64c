use anyhow::Result;
use sqlx::SqlitePool;

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at TEXT NOT NULL
        );

        -- Anime metadata mirror. id comes from AniList, never AUTOINCREMENT.
        CREATE TABLE IF NOT EXISTS anime (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            alt_title TEXT,
            description TEXT,
            episodes INTEGER,
            status TEXT,
            genres TEXT,
            cover_image TEXT,
            banner_image TEXT,
            year INTEGER,
            rating INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS user_anime (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            anime_id INTEGER NOT NULL REFERENCES anime(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            current_episode INTEGER NOT NULL DEFAULT 0,
            rating INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (user_id, anime_id)
        );

        -- Replaced wholesale on each trending sync; ranks are dense 1..N.
        CREATE TABLE IF NOT EXISTS trending_anime (
            anime_id INTEGER PRIMARY KEY REFERENCES anime(id) ON DELETE CASCADE,
            rank INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_lists (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS list_entries (
            list_id TEXT NOT NULL REFERENCES user_lists(id) ON DELETE CASCADE,
            anime_id INTEGER NOT NULL REFERENCES anime(id) ON DELETE CASCADE,
            episode INTEGER,
            rating INTEGER,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (list_id, anime_id)
        );

        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            display_name TEXT,
            bio TEXT,
            website TEXT,
            is_public INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS user_follows (
            follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            following_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (follower_id, following_id)
        );

        -- Admin-curated home page banners.
        CREATE TABLE IF NOT EXISTS hero_videos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            video_url TEXT NOT NULL,
            anime_id INTEGER REFERENCES anime(id) ON DELETE SET NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    create_indexes(pool).await?;

    Ok(())
}

/// Create all database indexes for the common access paths
async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Session validation and sweeping
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)",
        // Title search pre-filter
        "CREATE INDEX IF NOT EXISTS idx_anime_title ON anime(title)",
        "CREATE INDEX IF NOT EXISTS idx_anime_updated ON anime(updated_at)",
        // Library browsing: filter by user, then user+status
        "CREATE INDEX IF NOT EXISTS idx_user_anime_user ON user_anime(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_user_anime_user_status ON user_anime(user_id, status)",
        "CREATE INDEX IF NOT EXISTS idx_user_anime_anime ON user_anime(anime_id)",
        // Trending read path is ORDER BY rank
        "CREATE INDEX IF NOT EXISTS idx_trending_rank ON trending_anime(rank)",
        // Lists by owner, entries by list
        "CREATE INDEX IF NOT EXISTS idx_user_lists_user ON user_lists(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_list_entries_list ON list_entries(list_id)",
        // Follow edges are queried from both ends
        "CREATE INDEX IF NOT EXISTS idx_follows_follower ON user_follows(follower_id)",
        "CREATE INDEX IF NOT EXISTS idx_follows_following ON user_follows(following_id)",
        // Hero carousel ordering
        "CREATE INDEX IF NOT EXISTS idx_hero_sort ON hero_videos(enabled, sort_order)",
    ];

    for index_sql in indexes {
        if let Err(e) = sqlx::query(index_sql).execute(pool).await {
            tracing::warn!("Failed to create index: {} - {}", index_sql, e);
        }
    }

    tracing::debug!("Database indexes created/verified");

    Ok(())
}

/// Optimize the database (run periodically or on demand)
pub async fn optimize(pool: &SqlitePool) -> Result<()> {
    sqlx::query("ANALYZE").execute(pool).await?;
    sqlx::query("PRAGMA optimize").execute(pool).await?;
    Ok(())
}

// Single connection so every test query sees the same :memory: database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    migrate(&pool).await.expect("migrate");
    pool
}
