use serde::{Deserialize, Serialize};

/// Provider airing status strings as AniList reports them (the full
/// vocabulary also includes CANCELLED and HIATUS; only these three carry
/// validation semantics). Stored verbatim; unknown values pass through.
pub mod provider_status {
    pub const FINISHED: &str = "FINISHED";
    pub const RELEASING: &str = "RELEASING";
    pub const NOT_YET_RELEASED: &str = "NOT_YET_RELEASED";
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Anime metadata row. `id` is the AniList media id, never generated
/// locally; sync overwrites every metadata field on conflict.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Anime {
    pub id: i64,
    pub title: String,
    pub alt_title: Option<String>,
    pub description: Option<String>,
    pub episodes: Option<i64>,
    pub status: Option<String>,
    /// Stored as a JSON array string; rendered as an array in responses.
    #[serde(serialize_with = "genres_as_array")]
    pub genres: Option<String>,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
    pub year: Option<i64>,
    /// Provider community rating on a 0-100 scale.
    pub rating: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

fn genres_as_array<S: serde::Serializer>(
    genres: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::Serialize;
    let parsed: Vec<String> = genres
        .as_deref()
        .and_then(|g| serde_json::from_str(g).ok())
        .unwrap_or_default();
    parsed.serialize(serializer)
}

/// Watch status of a library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LibraryStatus {
    Watching,
    Completed,
    Planned,
    Dropped,
}

/// A user's per-anime tracking record, unique per (user, anime).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserAnime {
    pub user_id: String,
    pub anime_id: i64,
    pub status: LibraryStatus,
    pub current_episode: i64,
    pub rating: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserList {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ListEntry {
    pub list_id: String,
    pub anime_id: i64,
    pub episode: Option<i64>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub is_public: bool,
    pub updated_at: String,
}

/// Admin-curated featured video slot shown on the home page.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HeroVideo {
    pub id: String,
    pub title: String,
    pub video_url: String,
    pub anime_id: Option<i64>,
    pub sort_order: i64,
    pub enabled: bool,
    pub created_at: String,
}
