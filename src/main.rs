use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use pinnacle_analytics::api::{self, AppState};
use pinnacle_analytics::config::Config;
use pinnacle_analytics::db::{self, PgApiKeyStore};
use pinnacle_analytics::upstream::PinnacleClient;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {:?}", e);
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pinnacle_analytics=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Pinnacle Analytics API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let listen_addr = config.listen_addr();

    let pool = db::connect_db_with_retry(&config.database_url, 5).await?;
    db::run_migrations(&pool).await?;

    let sportsbook = PinnacleClient::new(&config)?;
    let state = AppState::new(
        config,
        Arc::new(PgApiKeyStore::new(pool)),
        Arc::new(sportsbook),
    );
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Application shutdown");
    Ok(())
}
