use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use survey_registry::config::Config;
use survey_registry::db::{self, seed};
use survey_registry::middleware::RateLimiter;
use survey_registry::services::Core;
use survey_registry::state::{AppState, SharedState};
use survey_registry::web;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::connect(&config.database_url, config.max_connections)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;

    tracing::info!("Running database migrations...");
    db::migrate(&pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        e
    })?;
    tracing::info!("Database migrations completed");

    if let Some((username, password)) = &config.bootstrap_admin {
        seed::seed_bootstrap_admin(&pool, username, password)
            .await
            .context("bootstrap admin seed failed")?;
    }

    let shared: SharedState = Arc::new(AppState {
        core: Core::new(pool, config.timezone),
        session_key: config.session_key.clone(),
        login_limiter: RateLimiter::per_minute(config.login_rate_limit),
        secure_cookies: config.secure_cookies,
    });

    let app = web::routes(shared).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr))?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
