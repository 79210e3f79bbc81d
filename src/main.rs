use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use dojo_outbox::config::Config;
use dojo_outbox::db::{MemoryOutboxStore, OutboxStore, PgOutboxStore};
use dojo_outbox::worker::Scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting dojo-outbox");

    let store: Arc<dyn OutboxStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied");

            Arc::new(PgOutboxStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, outbox entries will not survive a restart");
            Arc::new(MemoryOutboxStore::new())
        }
    };

    let executors = dojo_outbox::build_executors(&config);
    let addr = SocketAddr::new(config.host, config.port);
    let (app, state) = dojo_outbox::build_app(store, executors, config);

    let scheduler = Scheduler::from_config(state.processor.clone()).start();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
