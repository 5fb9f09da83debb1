//! Livechat API server entry point

use anyhow::Context;

use livechat_api::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("livechat_api=debug,tower_http=info")
            }),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool =
        livechat_shared::db::create_pool(&config.database_url, config.database_max_connections)
            .await
            .context("failed to connect to database")?;
    livechat_shared::db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .context("failed to create upload directory")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Livechat API listening");

    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
