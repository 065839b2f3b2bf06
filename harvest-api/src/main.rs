use anyhow::Context;
use harvest_api::{app, AppState};
use harvest_store::{Config, DbClient, MemoryStore, PgStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harvest_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Harvest API on port {}", config.server.port);

    let app_state = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            AppState::from_config(Arc::new(PgStore::new(db.pool.clone())), &config)?
        }
        None => {
            tracing::warn!("No database configured; state is kept in memory and lost on exit");
            AppState::from_config(Arc::new(MemoryStore::new()), &config)?
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
