use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use studyhall::config::{Cli, Command, Config};
use studyhall::db;
use studyhall::email::EmailService;
use studyhall::media::LocalMediaStore;
use studyhall::state::{AppState, DbPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::BackfillPictures => {
            let conn = pool.get()?;
            let updated = db::posts::backfill_author_pictures(&conn)?;
            tracing::info!("Refreshed author pictures on {} posts", updated);
            Ok(())
        }
    }
}

async fn serve(pool: DbPool, config: Config) -> anyhow::Result<()> {
    let media_root = config.media_path();
    std::fs::create_dir_all(&media_root)?;
    let media = Arc::new(LocalMediaStore::new(media_root, &config.media.public_url));
    let mailer = Arc::new(EmailService::new(&config.email)?);

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::new(pool, config, media, mailer);
    let app = studyhall::app::router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received");
}
