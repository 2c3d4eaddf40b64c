// Configuration module for anilog-server
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;

const APP_NAME: &str = "anilog-server";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// AniList provider configuration
    pub anilist: AniListConfig,

    /// Background sync configuration
    pub sync: SyncConfig,

    /// Session configuration
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 3001)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (database location)
    pub data_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AniListConfig {
    /// GraphQL endpoint (default: https://graphql.anilist.co)
    pub api_url: String,

    /// Trending page size per sync request (default: 100)
    pub trending_page_size: i64,

    /// Batch size for full-sync id refetches (default: 50)
    pub sync_batch_size: i64,

    /// Page size for ad-hoc provider searches (default: 10)
    pub search_page_size: i64,
}

impl Default for AniListConfig {
    fn default() -> Self {
        Self {
            api_url: "https://graphql.anilist.co".to_string(),
            trending_page_size: 100,
            sync_batch_size: 50,
            search_page_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Trending sync interval in minutes (default: 60, 0 to disable)
    pub trending_interval_minutes: u64,

    /// Full metadata re-sync interval in hours (default: 24, 0 to disable)
    pub full_sync_interval_hours: u64,

    /// Run a trending sync shortly after startup (default: false)
    pub sync_on_startup: bool,

    /// Bearer secret accepted on the sync endpoints
    /// (ANILOG_CRON_SECRET env var takes priority)
    pub cron_secret: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            trending_interval_minutes: 60,
            full_sync_interval_hours: 24,
            sync_on_startup: false,
            cron_secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session lifetime in hours (default: 720 = 30 days)
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 720,
        }
    }
}

/// Application paths following XDG Base Directory Specification on Unix
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    pub config_dir: PathBuf,

    /// Directory for persistent data (database)
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (ANILOG_CONFIG_DIR, ANILOG_DATA_DIR)
    /// 2. Config file overrides
    /// 3. XDG directories
    /// 4. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_config_dir(&config_overrides.config_dir),
            data_dir: Self::resolve_data_dir(&config_overrides.data_dir),
        }
    }

    /// Create application paths using current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd,
        }
    }

    fn resolve_config_dir(config_override: &Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var("ANILOG_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(ref path) = config_override {
            return path.clone();
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn resolve_data_dir(config_override: &Option<PathBuf>) -> PathBuf {
        if let Ok(path) = std::env::var("ANILOG_DATA_DIR") {
            return PathBuf::from(path);
        }
        if let Some(ref path) = config_override {
            return path.clone();
        }
        if let Some(dir) = dirs::data_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("anilog.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }

    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new(&PathsConfig::default())
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application paths
    pub paths: AppPaths,

    /// Server port
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// AniList provider settings
    pub anilist: AniListConfig,

    /// Background sync settings
    pub sync: SyncConfig,

    /// Session settings
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let portable_mode = std::env::var("ANILOG_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            let config_file = Self::load_config_file(
                &std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            );
            return Self::build(config_file, AppPaths::current_dir());
        }

        let config_dir = Self::find_config_dir();
        let config_file = Self::load_config_file(&config_dir);
        let paths = AppPaths::new(&config_file.paths);

        Self::build(config_file, paths)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("ANILOG_CONFIG_DIR") {
            return PathBuf::from(path);
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile, paths: AppPaths) -> Self {
        // Port: env > config > default
        let port = Self::env_port().unwrap_or(config_file.server.port);

        // Bind address: env > config > default
        let bind_address = std::env::var("ANILOG_BIND_ADDRESS")
            .unwrap_or_else(|_| config_file.server.bind_address.clone());

        let mut sync = config_file.sync;
        if let Ok(secret) = std::env::var("ANILOG_CRON_SECRET") {
            sync.cron_secret = Some(secret);
        }

        let mut anilist = config_file.anilist;
        if let Ok(url) = std::env::var("ANILIST_API_URL") {
            anilist.api_url = url;
        }

        Self {
            paths,
            port,
            bind_address,
            anilist,
            sync,
            auth: config_file.auth,
        }
    }

    fn env_port() -> Option<u16> {
        std::env::var("ANILOG_PORT").ok().and_then(|p| p.parse().ok())
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Server listening on {}:{}", self.bind_address, self.port);
        tracing::info!("AniList endpoint: {}", self.anilist.api_url);

        if self.sync.trending_interval_minutes > 0 {
            tracing::info!(
                "Trending sync every {} minutes",
                self.sync.trending_interval_minutes
            );
        } else {
            tracing::info!("Trending sync disabled");
        }

        if self.sync.full_sync_interval_hours > 0 {
            tracing::info!(
                "Full metadata sync every {} hours",
                self.sync.full_sync_interval_hours
            );
        } else {
            tracing::debug!("Full metadata sync disabled");
        }

        if self.sync.cron_secret.is_none() {
            tracing::warn!("No cron secret configured; sync endpoints are disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_format() {
        let paths = AppPaths::current_dir();
        let url = paths.database_url();
        assert!(url.starts_with("sqlite:"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.anilist.trending_page_size, 100);
        assert_eq!(config.anilist.sync_batch_size, 50);
        assert!(config.sync.cron_secret.is_none());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[server]
port = 9000
bind_address = "127.0.0.1"

[anilist]
api_url = "http://localhost:4000/graphql"

[sync]
trending_interval_minutes = 15
cron_secret = "s3cret"

[auth]
session_ttl_hours = 24
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.anilist.api_url, "http://localhost:4000/graphql");
        assert_eq!(config.sync.trending_interval_minutes, 15);
        assert_eq!(config.sync.cron_secret, Some("s3cret".to_string()));
        assert_eq!(config.auth.session_ttl_hours, 24);
    }

    #[test]
    fn test_partial_config_toml() {
        // Partial configs keep defaults for everything unspecified
        let toml_str = r#"
[sync]
sync_on_startup = true
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 3001);
        assert!(config.sync.sync_on_startup);
        assert_eq!(config.sync.trending_interval_minutes, 60);
    }
}
