// Anime catalog: local search/ranking, archive search, AniList sync.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::cache::TtlCache;
use crate::config::AniListConfig;
use crate::error::{AppError, AppResult};
use crate::models::Anime;
use crate::services::anilist::{media_to_record, AniListClient, AnimeRecord};

/// How long archive search results are served from cache.
const ARCHIVE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Pre-filter window multiplier for the global half of archive search.
const ARCHIVE_WINDOW_FACTOR: i64 = 5;

/// Combined result of an archive search: the caller's own library
/// matches first, then the rest of the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSearchResult {
    pub library: Vec<Anime>,
    pub archive: Vec<Anime>,
}

impl ArchiveSearchResult {
    fn empty() -> Self {
        Self {
            library: Vec::new(),
            archive: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub upserted: usize,
    pub batches_failed: usize,
}

pub struct AnimeService {
    pub anilist: AniListClient,
    trending_page_size: i64,
    sync_batch_size: i64,
    archive_cache: TtlCache<(String, String, i64), ArchiveSearchResult>,
}

impl AnimeService {
    pub fn new(config: &AniListConfig) -> Self {
        Self {
            anilist: AniListClient::new(config),
            trending_page_size: config.trending_page_size,
            sync_batch_size: config.sync_batch_size,
            archive_cache: TtlCache::new(ARCHIVE_CACHE_TTL),
        }
    }

    pub async fn get_anime(&self, pool: &SqlitePool, id: i64) -> AppResult<Anime> {
        sqlx::query_as::<_, Anime>("SELECT * FROM anime WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Anime not found"))
    }

    /// Current trending list in rank order
    pub async fn get_trending(&self, pool: &SqlitePool) -> AppResult<Vec<Anime>> {
        let rows = sqlx::query_as::<_, Anime>(
            r#"
            SELECT a.*
            FROM anime a
            JOIN trending_anime t ON t.anime_id = a.id
            ORDER BY t.rank ASC
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Most recently updated catalog rows, paged
    pub async fn get_recent(
        &self,
        pool: &SqlitePool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Anime>> {
        let rows = sqlx::query_as::<_, Anime>(
            "SELECT * FROM anime ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Ranked search over the local catalog
    pub async fn search_local(
        &self,
        pool: &SqlitePool,
        query: &str,
        limit: i64,
    ) -> AppResult<Vec<Anime>> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(query);
        let window = limit * ARCHIVE_WINDOW_FACTOR;
        let candidates = sqlx::query_as::<_, Anime>(
            r#"
            SELECT * FROM anime
            WHERE title LIKE ? ESCAPE '\' OR alt_title LIKE ? ESCAPE '\'
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(window)
        .fetch_all(pool)
        .await?;

        Ok(rank(candidates, query, limit as usize))
    }

    /// Archive search: the user's own library first, then the rest of the
    /// catalog excluding ids already matched. Queries shorter than two
    /// characters return empty sets without touching the database.
    /// Results are cached per (user, normalized query, limit) for 30s.
    pub async fn archive_search(
        &self,
        pool: &SqlitePool,
        user_id: &str,
        query: &str,
        limit: i64,
    ) -> AppResult<Arc<ArchiveSearchResult>> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Ok(Arc::new(ArchiveSearchResult::empty()));
        }

        let normalized = query.to_lowercase();
        let key = (user_id.to_string(), normalized, limit);
        if let Some(cached) = self.archive_cache.get(&key) {
            tracing::debug!("Archive search cache hit for '{}'", query);
            return Ok(cached);
        }

        let pattern = like_pattern(query);

        let library_candidates = sqlx::query_as::<_, Anime>(
            r#"
            SELECT a.*
            FROM anime a
            JOIN user_anime ua ON ua.anime_id = a.id
            WHERE ua.user_id = ?
              AND (a.title LIKE ? ESCAPE '\' OR a.alt_title LIKE ? ESCAPE '\')
            "#,
        )
        .bind(user_id)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

        let library = rank(library_candidates, query, limit as usize);
        let matched_ids: Vec<i64> = library.iter().map(|a| a.id).collect();

        // Larger pre-filter window for the global half, ranked down to the
        // requested limit afterwards.
        let window = limit * ARCHIVE_WINDOW_FACTOR;
        let placeholders = if matched_ids.is_empty() {
            String::new()
        } else {
            let marks = vec!["?"; matched_ids.len()].join(",");
            format!("AND a.id NOT IN ({})", marks)
        };
        let sql = format!(
            r#"
            SELECT a.* FROM anime a
            WHERE (a.title LIKE ? ESCAPE '\' OR a.alt_title LIKE ? ESCAPE '\')
            {}
            ORDER BY a.updated_at DESC
            LIMIT ?
            "#,
            placeholders
        );

        let mut q = sqlx::query_as::<_, Anime>(&sql).bind(&pattern).bind(&pattern);
        for id in &matched_ids {
            q = q.bind(*id);
        }
        let archive_candidates = q.bind(window).fetch_all(pool).await?;
        let archive = rank(archive_candidates, query, limit as usize);

        let result = ArchiveSearchResult { library, archive };
        Ok(self.archive_cache.insert(key, result))
    }

    /// Trending sync: one provider request, upsert everything, then
    /// replace the trending table inside a transaction so readers never
    /// observe it empty. Rank = response order, 1-based.
    pub async fn sync_trending(&self, pool: &SqlitePool) -> AppResult<SyncReport> {
        let media = self.anilist.fetch_trending(self.trending_page_size).await?;
        tracing::info!("Trending sync: fetched {} titles", media.len());

        let records: Vec<AnimeRecord> = media.iter().map(media_to_record).collect();

        let mut tx = pool.begin().await?;
        for record in &records {
            upsert_anime(&mut *tx, record).await?;
        }

        sqlx::query("DELETE FROM trending_anime").execute(&mut *tx).await?;
        for (i, record) in records.iter().enumerate() {
            sqlx::query("INSERT INTO trending_anime (anime_id, rank) VALUES (?, ?)")
                .bind(record.id)
                .bind((i + 1) as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(SyncReport {
            fetched: media.len(),
            upserted: records.len(),
            batches_failed: 0,
        })
    }

    /// Full sync: page all known local ids in batches, re-fetch each
    /// batch from the provider and upsert. Failed or empty batches are
    /// logged and skipped, never abort the run.
    pub async fn sync_full(&self, pool: &SqlitePool) -> AppResult<SyncReport> {
        let mut report = SyncReport {
            fetched: 0,
            upserted: 0,
            batches_failed: 0,
        };
        let mut offset: i64 = 0;

        loop {
            let ids: Vec<(i64,)> =
                sqlx::query_as("SELECT id FROM anime ORDER BY id ASC LIMIT ? OFFSET ?")
                    .bind(self.sync_batch_size)
                    .bind(offset)
                    .fetch_all(pool)
                    .await?;
            if ids.is_empty() {
                break;
            }
            offset += ids.len() as i64;

            let batch: Vec<i64> = ids.into_iter().map(|(id,)| id).collect();
            let media = match self.anilist.fetch_by_ids(&batch).await {
                Ok(media) => media,
                Err(e) => {
                    tracing::warn!("Full sync batch at offset {} failed: {}", offset, e);
                    report.batches_failed += 1;
                    continue;
                }
            };
            if media.is_empty() {
                tracing::warn!("Full sync batch at offset {} returned nothing", offset);
                continue;
            }

            report.fetched += media.len();
            for m in &media {
                let record = media_to_record(m);
                if let Err(e) = upsert_anime(pool, &record).await {
                    tracing::warn!("Upsert of anime {} failed: {}", record.id, e);
                } else {
                    report.upserted += 1;
                }
            }
        }

        tracing::info!(
            "Full sync complete: {} fetched, {} upserted, {} batches failed",
            report.fetched,
            report.upserted,
            report.batches_failed
        );
        Ok(report)
    }
}

/// Upsert one anime row by provider id; every metadata field is
/// overwritten on conflict.
pub async fn upsert_anime<'e, E>(executor: E, record: &AnimeRecord) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO anime (
            id, title, alt_title, description, episodes, status, genres,
            cover_image, banner_image, year, rating
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            alt_title = excluded.alt_title,
            description = excluded.description,
            episodes = excluded.episodes,
            status = excluded.status,
            genres = excluded.genres,
            cover_image = excluded.cover_image,
            banner_image = excluded.banner_image,
            year = excluded.year,
            rating = excluded.rating,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(record.id)
    .bind(&record.title)
    .bind(&record.alt_title)
    .bind(&record.description)
    .bind(record.episodes)
    .bind(&record.status)
    .bind(&record.genres)
    .bind(&record.cover_image)
    .bind(&record.banner_image)
    .bind(record.year)
    .bind(record.rating)
    .execute(executor)
    .await?;
    Ok(())
}

/// Score one title against a lowercased query.
/// Exact match 4, prefix 3, word boundary 2, substring 1, no match 0.
/// A boundary is the start of the string or a position preceded by
/// whitespace, '-', ':' or a parenthesis.
fn score_title(query: &str, title: &str) -> i64 {
    let title = title.to_lowercase();
    if title == query {
        return 4;
    }
    if title.starts_with(query) {
        return 3;
    }

    let mut best = 0;
    for (idx, _) in title.match_indices(query) {
        let prev = title[..idx].chars().next_back();
        let score = match prev {
            Some(c) if c.is_whitespace() || matches!(c, '-' | ':' | '(' | ')') => 2,
            _ => 1,
        };
        if score > best {
            best = score;
        }
        if best == 2 {
            break;
        }
    }
    best
}

/// Best score across the primary and alt title
fn score_anime(query: &str, anime: &Anime) -> i64 {
    let primary = score_title(query, &anime.title);
    if primary == 4 {
        return 4;
    }
    let alt = anime
        .alt_title
        .as_deref()
        .map(|t| score_title(query, t))
        .unwrap_or(0);
    primary.max(alt)
}

/// Sort candidates by descending score, ties by most recently updated,
/// and truncate to the requested limit. Zero-score rows are dropped.
fn rank(candidates: Vec<Anime>, query: &str, limit: usize) -> Vec<Anime> {
    let query = query.to_lowercase();
    let mut scored: Vec<(i64, Anime)> = candidates
        .into_iter()
        .filter_map(|anime| {
            let score = score_anime(&query, &anime);
            (score > 0).then_some((score, anime))
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| b.updated_at.cmp(&a.updated_at)));
    scored.into_iter().take(limit).map(|(_, a)| a).collect()
}

/// Escape LIKE wildcards in user input and wrap in %...%
fn like_pattern(query: &str) -> String {
    let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn anime(id: i64, title: &str, alt: Option<&str>, updated_at: &str) -> Anime {
        Anime {
            id,
            title: title.to_string(),
            alt_title: alt.map(|s| s.to_string()),
            description: None,
            episodes: Some(12),
            status: Some("FINISHED".to_string()),
            genres: None,
            cover_image: None,
            banner_image: None,
            year: Some(2020),
            rating: Some(70),
            created_at: "2024-01-01 00:00:00".to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    #[test]
    fn test_score_tiers_are_ordered() {
        // exact > prefix > boundary > substring for the same query
        assert_eq!(score_title("monster", "Monster"), 4);
        assert_eq!(score_title("monster", "Monster Musume"), 3);
        assert_eq!(score_title("monster", "The Monster Within"), 2);
        assert_eq!(score_title("monster", "Pocketmonster"), 1);
        assert_eq!(score_title("monster", "Cowboy Bebop"), 0);
    }

    #[test]
    fn test_boundary_characters() {
        assert_eq!(score_title("zero", "Re: Zero"), 2);
        assert_eq!(score_title("zero", "Re-Zero"), 2);
        assert_eq!(score_title("zero", "Fate (Zero)"), 2);
        // Later occurrence at a boundary beats an embedded first one
        assert_eq!(score_title("star", "Restart a Star"), 2);
    }

    #[test]
    fn test_alt_title_contributes_max() {
        let a = anime(1, "Shingeki no Kyojin", Some("Attack on Titan"), "2024");
        assert_eq!(score_anime("attack on titan", &a), 4);
        assert_eq!(score_anime("attack", &a), 3);
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let candidates = vec![
            anime(1, "Pocketmonster", None, "2024-06-01 00:00:00"),
            anime(2, "Monster", None, "2024-01-01 00:00:00"),
            anime(3, "Monster Musume", None, "2024-03-01 00:00:00"),
            anime(4, "The Monster Within", None, "2024-02-01 00:00:00"),
            anime(5, "Unrelated", None, "2024-05-01 00:00:00"),
        ];

        let ranked = rank(candidates, "Monster", 3);
        let ids: Vec<i64> = ranked.iter().map(|a| a.id).collect();
        // exact, prefix, boundary; substring truncated away, no-match dropped
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_rank_ties_break_by_updated_at() {
        let candidates = vec![
            anime(1, "Monster Hunter", None, "2024-01-01 00:00:00"),
            anime(2, "Monster Musume", None, "2024-06-01 00:00:00"),
        ];
        let ranked = rank(candidates, "monster", 10);
        let ids: Vec<i64> = ranked.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    async fn seed(pool: &SqlitePool, id: i64, title: &str) {
        upsert_anime(
            pool,
            &AnimeRecord {
                id,
                title: title.to_string(),
                alt_title: None,
                description: None,
                episodes: Some(12),
                status: Some("FINISHED".to_string()),
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
    async fn test_archive_search_short_query_is_empty_without_db() {
        let service = AnimeService::new(&crate::config::AniListConfig::default());
        // A closed pool would error on any query; the short-circuit path
        // must never reach it.
        let pool = db::test_pool().await;
        pool.close().await;

        let result = service.archive_search(&pool, "u1", " a ", 10).await.unwrap();
        assert!(result.library.is_empty());
        assert!(result.archive.is_empty());
    }

    #[tokio::test]
    async fn test_archive_search_splits_library_and_archive() {
        let pool = db::test_pool().await;
        let service = AnimeService::new(&crate::config::AniListConfig::default());

        let user = crate::services::auth::create_user(&pool, "searcher", "password123", false)
            .await
            .unwrap();

        seed(&pool, 1, "Monster").await;
        seed(&pool, 2, "Monster Musume").await;
        seed(&pool, 3, "The Monster Within").await;

        sqlx::query(
            "INSERT INTO user_anime (user_id, anime_id, status, current_episode) VALUES (?, ?, 'watching', 3)",
        )
        .bind(&user.id)
        .bind(1i64)
        .execute(&pool)
        .await
        .unwrap();

        let result = service
            .archive_search(&pool, &user.id, "monster", 10)
            .await
            .unwrap();

        assert_eq!(result.library.len(), 1);
        assert_eq!(result.library[0].id, 1);
        let archive_ids: Vec<i64> = result.archive.iter().map(|a| a.id).collect();
        assert_eq!(archive_ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_archive_search_cache_returns_identical_arc() {
        let pool = db::test_pool().await;
        let service = AnimeService::new(&crate::config::AniListConfig::default());
        seed(&pool, 1, "Monster").await;

        let first = service.archive_search(&pool, "u1", "monster", 10).await.unwrap();
        let second = service.archive_search(&pool, "u1", "monster", 10).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Different limit is a different cache key
        let third = service.archive_search(&pool, "u1", "monster", 5).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_on_conflict() {
        let pool = db::test_pool().await;
        seed(&pool, 42, "Old Title").await;
        seed(&pool, 42, "New Title").await;

        let row: (String,) = sqlx::query_as("SELECT title FROM anime WHERE id = 42")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, "New Title");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM anime")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
