use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::config::AniListConfig;
use crate::error::{AppError, AppResult};

/// How long ad-hoc provider searches are served from cache.
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(60);

/// AniList GraphQL client
pub struct AniListClient {
    client: Client,
    api_url: String,
    search_page_size: i64,
    search_cache: TtlCache<String, Vec<Media>>,
}

/// GraphQL request wrapper
#[derive(Debug, Serialize)]
struct GraphQLRequest {
    query: String,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "Page")]
    page: Option<PageData>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    media: Option<Vec<Media>>,
}

/// AniList media (anime) data
#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub id: i64,
    pub title: Option<Title>,
    pub description: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    pub genres: Option<Vec<String>>,
    #[serde(rename = "coverImage")]
    pub cover_image: Option<CoverImage>,
    #[serde(rename = "bannerImage")]
    pub banner_image: Option<String>,
    #[serde(rename = "averageScore")]
    pub average_score: Option<i64>,
    #[serde(rename = "seasonYear")]
    pub season_year: Option<i64>,
    #[serde(rename = "startDate")]
    pub start_date: Option<FuzzyDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Title {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverImage {
    #[serde(rename = "extraLarge")]
    pub extra_large: Option<String>,
    pub large: Option<String>,
    pub medium: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i64>,
}

/// Field set upserted into the local anime table
#[derive(Debug, Clone, PartialEq)]
pub struct AnimeRecord {
    pub id: i64,
    pub title: String,
    pub alt_title: Option<String>,
    pub description: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    pub genres: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub year: Option<i64>,
    pub rating: Option<i64>,
}

const MEDIA_FIELDS: &str = r#"
    id
    title {
        romaji
        english
        native
    }
    description(asHtml: false)
    episodes
    status
    genres
    coverImage {
        extraLarge
        large
        medium
    }
    bannerImage
    averageScore
    seasonYear
    startDate {
        year
    }
"#;

impl AniListClient {
    pub fn new(config: &AniListConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            search_page_size: config.search_page_size,
            search_cache: TtlCache::new(SEARCH_CACHE_TTL),
        }
    }

    async fn post(&self, query: String, variables: serde_json::Value) -> AppResult<Vec<Media>> {
        let request = GraphQLRequest { query, variables };

        let response: GraphQLResponse = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Bad AniList response: {}", e)))?;

        Ok(response
            .data
            .and_then(|d| d.page)
            .and_then(|p| p.media)
            .unwrap_or_default())
    }

    /// Search for anime by title. Results are cached for 60 seconds
    /// keyed by the normalized query.
    pub async fn search(&self, query: &str) -> AppResult<Arc<Vec<Media>>> {
        let normalized = query.trim().to_lowercase();

        if let Some(cached) = self.search_cache.get(&normalized) {
            tracing::debug!("AniList search cache hit for '{}'", normalized);
            return Ok(cached);
        }

        let graphql = format!(
            r#"
            query ($search: String, $perPage: Int) {{
                Page(page: 1, perPage: $perPage) {{
                    media(search: $search, type: ANIME, sort: SEARCH_MATCH) {{
                        {MEDIA_FIELDS}
                    }}
                }}
            }}
            "#
        );

        let variables = serde_json::json!({
            "search": query.trim(),
            "perPage": self.search_page_size,
        });

        let media = self.post(graphql, variables).await?;
        Ok(self.search_cache.insert(normalized, media))
    }

    /// Fetch the current trending list, most-trending first
    pub async fn fetch_trending(&self, page_size: i64) -> AppResult<Vec<Media>> {
        let graphql = format!(
            r#"
            query ($perPage: Int) {{
                Page(page: 1, perPage: $perPage) {{
                    media(type: ANIME, sort: TRENDING_DESC) {{
                        {MEDIA_FIELDS}
                    }}
                }}
            }}
            "#
        );

        let variables = serde_json::json!({ "perPage": page_size });
        self.post(graphql, variables).await
    }

    /// Re-fetch a batch of known ids (full-sync path)
    pub async fn fetch_by_ids(&self, ids: &[i64]) -> AppResult<Vec<Media>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let graphql = format!(
            r#"
            query ($ids: [Int], $perPage: Int) {{
                Page(page: 1, perPage: $perPage) {{
                    media(id_in: $ids, type: ANIME) {{
                        {MEDIA_FIELDS}
                    }}
                }}
            }}
            "#
        );

        let variables = serde_json::json!({
            "ids": ids,
            "perPage": ids.len() as i64,
        });
        self.post(graphql, variables).await
    }
}

fn strip_html(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex literal"));
    re.replace_all(text, "").trim().to_string()
}

/// Convert AniList media into the local anime row shape.
/// Prefers the English title, falling back to Romaji; the other variant
/// becomes the alt title.
pub fn media_to_record(media: &Media) -> AnimeRecord {
    let title_data = media.title.as_ref();
    let english = title_data.and_then(|t| t.english.clone());
    let romaji = title_data.and_then(|t| t.romaji.clone());
    let native = title_data.and_then(|t| t.native.clone());

    let title = english
        .clone()
        .or_else(|| romaji.clone())
        .or_else(|| native.clone())
        .unwrap_or_else(|| format!("AniList #{}", media.id));

    let alt_title = if english.is_some() {
        romaji.or(native)
    } else {
        native
    }
    .filter(|alt| *alt != title);

    let description = media.description.as_deref().map(strip_html);

    let genres = media
        .genres
        .as_ref()
        .and_then(|g| serde_json::to_string(g).ok());

    let cover_image = media
        .cover_image
        .as_ref()
        .and_then(|c| c.extra_large.clone().or_else(|| c.large.clone()));

    let year = media
        .season_year
        .or_else(|| media.start_date.as_ref().and_then(|d| d.year));

    AnimeRecord {
        id: media.id,
        title,
        alt_title,
        description,
        episodes: media.episodes,
        status: media.status.clone(),
        genres,
        cover_image,
        banner_image: media.banner_image.clone(),
        year,
        rating: media.average_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_media() -> Media {
        Media {
            id: 16498,
            title: Some(Title {
                romaji: Some("Shingeki no Kyojin".to_string()),
                english: Some("Attack on Titan".to_string()),
                native: Some("進撃の巨人".to_string()),
            }),
            description: Some("Humanity lives <i>inside</i> walls.<br>".to_string()),
            episodes: Some(25),
            status: Some("FINISHED".to_string()),
            genres: Some(vec!["Action".to_string(), "Drama".to_string()]),
            cover_image: Some(CoverImage {
                extra_large: Some("https://img.example/xl.jpg".to_string()),
                large: Some("https://img.example/l.jpg".to_string()),
                medium: None,
            }),
            banner_image: Some("https://img.example/banner.jpg".to_string()),
            average_score: Some(85),
            season_year: Some(2013),
            start_date: Some(FuzzyDate { year: Some(2013) }),
        }
    }

    #[test]
    fn test_media_to_record() {
        let record = media_to_record(&sample_media());

        assert_eq!(record.id, 16498);
        assert_eq!(record.title, "Attack on Titan");
        assert_eq!(record.alt_title, Some("Shingeki no Kyojin".to_string()));
        assert_eq!(
            record.description,
            Some("Humanity lives inside walls.".to_string())
        );
        assert_eq!(record.episodes, Some(25));
        assert_eq!(record.status, Some("FINISHED".to_string()));
        assert_eq!(record.genres, Some(r#"["Action","Drama"]"#.to_string()));
        assert_eq!(record.cover_image, Some("https://img.example/xl.jpg".to_string()));
        assert_eq!(record.year, Some(2013));
        assert_eq!(record.rating, Some(85));
    }

    #[test]
    fn test_media_to_record_romaji_fallback() {
        let mut media = sample_media();
        media.title = Some(Title {
            romaji: Some("Mushishi".to_string()),
            english: None,
            native: Some("蟲師".to_string()),
        });

        let record = media_to_record(&media);
        assert_eq!(record.title, "Mushishi");
        assert_eq!(record.alt_title, Some("蟲師".to_string()));
    }

    #[test]
    fn test_media_to_record_year_falls_back_to_start_date() {
        let mut media = sample_media();
        media.season_year = None;
        let record = media_to_record(&media);
        assert_eq!(record.year, Some(2013));
    }
}
