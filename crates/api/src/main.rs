//! Adaptive Assessment Core server binary.

use std::sync::Arc;
use std::time::Duration;

use assess_api::{build_router, run_expiry_sweep, AppState};
use assess_config::AppConfig;
use assess_storage::{create_pool, run_migrations};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting adaptive assessment core");

    let config = AppConfig::from_env()?;
    tracing::info!("binding to {}", config.bind_address);

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("database connection pool created");

    run_migrations(&pool).await?;
    tracing::info!("database migrations complete");

    let expiry_interval = Duration::from_secs(config.expiry_scan_interval_s);
    let state = Arc::new(AppState::new(pool, config.clone()));

    tokio::spawn(run_expiry_sweep(state.clone(), expiry_interval));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
