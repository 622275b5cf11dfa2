//! Mundo Tango - backend for the tango social network

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mundotango::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
    services::{delivery::Delivery, LoginRateLimiter},
    tasks::{self, MemoryMonitor},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mundotango=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mundo Tango backend...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Initialize cache
    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized: {:?}", config.cache.driver);

    let delivery = Arc::new(Delivery::from_config(&config.notifications)?);
    if !delivery.is_enabled() {
        tracing::info!("No push or email channel configured, notifications are stored only");
    }

    // Build application state
    let rate_limiter = Arc::new(LoginRateLimiter::from_config(&config.auth));
    let state = AppState::build(
        &config,
        pool.clone(),
        cache.clone(),
        delivery,
        rate_limiter.clone(),
    );

    // Background tasks
    tasks::spawn_session_cleanup(state.user_service.clone());
    tasks::spawn_upload_purge(state.upload_service.clone());
    tasks::spawn_rate_limiter_cleanup(rate_limiter);
    MemoryMonitor::new(
        config.server.memory_limit_mb,
        cache,
        state.request_stats.clone(),
    )
    .spawn(Duration::from_secs(config.server.memory_check_interval_secs.max(1)));

    // Build router
    let app = api::build_router(state, &config.server.cors_origin, &config.upload.path);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    // peer addresses feed the per-IP login limit
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
