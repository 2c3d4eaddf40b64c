use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod db;
mod error;
mod models;
mod services;

use config::AppConfig;
use services::anime::AnimeService;

/// Tracks all background task handles for graceful shutdown
struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    async fn shutdown(self) {
        tracing::info!("Initiating graceful shutdown...");

        // Signal all tasks to stop
        self.shutdown.cancel();

        // Wait for all tasks with a timeout
        for (name, handle) in self.handles {
            tracing::debug!("Waiting for {} to finish...", name);
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("{} finished cleanly", name),
                Ok(Err(e)) => tracing::warn!("{} panicked: {}", name, e),
                Err(_) => tracing::warn!("{} timed out during shutdown", name),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
    pub anime: AnimeService,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anilog_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    // Database setup with optimized connection pool
    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        // WAL mode for concurrent reads during sync writes
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync is safe with WAL and much faster
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        // Enable foreign key enforcement
        .foreign_keys(true)
        // Busy timeout for concurrent access (5 seconds)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(connect_options)
        .await?;

    tracing::info!("SQLite configured: WAL mode, foreign keys on");

    db::migrate(&pool).await?;
    db::optimize(&pool).await?;

    // Create default admin user if no users exist
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;

    if user_count.0 == 0 {
        let password = std::env::var("ANILOG_ADMIN_PASSWORD")
            .unwrap_or_else(|_| "changeme-admin".to_string());
        tracing::info!("No users found, creating default admin user");
        services::auth::create_user(&pool, "admin", &password, true).await?;
        tracing::info!("Created default admin user (username: admin)");
    }

    let state = std::sync::Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        anime: AnimeService::new(&config.anilist),
    });

    // Initialize background task manager with graceful shutdown support
    let mut bg_tasks = BackgroundTasks::new();
    let shutdown_token = bg_tasks.token();

    // Spawn periodic AniList sync task with cancellation support
    if config.sync.trending_interval_minutes > 0 || config.sync.full_sync_interval_hours > 0 {
        let sync_state = state.clone();
        let sync_config = config.clone();
        let cancel = shutdown_token.clone();
        bg_tasks.spawn("anilist-sync", async move {
            tokio::time::sleep(Duration::from_secs(5)).await;

            let trending_interval =
                Duration::from_secs(sync_config.sync.trending_interval_minutes * 60);
            let full_interval =
                Duration::from_secs(sync_config.sync.full_sync_interval_hours * 3600);

            let mut last_trending_sync = std::time::Instant::now();
            let mut last_full_sync = std::time::Instant::now();

            if sync_config.sync.sync_on_startup {
                tracing::info!("Running startup trending sync...");
                match sync_state.anime.sync_trending(&sync_state.db).await {
                    Ok(report) => {
                        tracing::info!("Startup trending sync: {} titles", report.upserted)
                    }
                    Err(e) => tracing::error!("Startup trending sync failed: {}", e),
                }
            }

            let check_interval = Duration::from_secs(60);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Sync task received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(check_interval) => {
                        let now = std::time::Instant::now();

                        if sync_config.sync.trending_interval_minutes > 0
                            && now.duration_since(last_trending_sync) >= trending_interval
                        {
                            match sync_state.anime.sync_trending(&sync_state.db).await {
                                Ok(report) => tracing::info!(
                                    "Trending sync: {} fetched, {} upserted",
                                    report.fetched, report.upserted
                                ),
                                Err(e) => tracing::error!("Trending sync failed: {}", e),
                            }
                            last_trending_sync = now;
                        }

                        if sync_config.sync.full_sync_interval_hours > 0
                            && now.duration_since(last_full_sync) >= full_interval
                        {
                            if let Err(e) = sync_state.anime.sync_full(&sync_state.db).await {
                                tracing::error!("Full sync failed: {}", e);
                            }
                            last_full_sync = now;
                        }
                    }
                }
            }
        });
    } else {
        tracing::info!("AniList background sync disabled (intervals set to 0)");
    }

    // Spawn session cleanup task with cancellation
    {
        let session_pool = pool.clone();
        let cancel = shutdown_token.clone();
        bg_tasks.spawn("session-cleanup", async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            tracing::info!("Session cleanup task started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session cleanup received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(3600)) => {
                        match services::auth::cleanup_expired_sessions(&session_pool).await {
                            Ok(removed) if removed > 0 => {
                                tracing::info!("Cleaned up {} expired sessions", removed);
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                        }
                    }
                }
            }
        });
    }

    // Root handler
    async fn root_handler() -> &'static str {
        "Anilog Server"
    }

    // Build router
    let app = Router::new()
        .route("/", get(root_handler).head(root_handler))
        .route("/health", get(|| async { "OK" }))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let bind_ip: std::net::IpAddr = config
        .bind_address
        .parse()
        .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
    let addr = SocketAddr::from((bind_ip, config.port));
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // After server stops, gracefully shutdown background tasks
    bg_tasks.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
