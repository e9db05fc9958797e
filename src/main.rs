use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use translation_hub::config::Config;
use translation_hub::db::Database;
use translation_hub::i18n::{DbMissReporter, Dictionary, Resolver};
use translation_hub::scheduler;
use translation_hub::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_hub=info".parse()?),
        )
        .init();

    info!("Starting Translation Hub");

    // Load configuration from environment
    let config = Config::from_env()?;

    // Open the store
    let db = Database::new(&config.database_path)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;

    // Load message dictionaries
    let locales_dir = Path::new(&config.locales_dir);
    let dictionary = if locales_dir.is_dir() {
        let dictionary = Dictionary::load_dir(locales_dir)?;
        info!("Loaded {} locales from {}", dictionary.locale_count(), config.locales_dir);
        dictionary
    } else {
        warn!("Locales directory {} not found, starting with an empty dictionary", config.locales_dir);
        Dictionary::new()
    };
    let resolver = Arc::new(Resolver::new(
        dictionary,
        Arc::new(DbMissReporter::new(db.clone())),
    ));

    // Start the daily retention sweep
    let _scheduler = scheduler::start_retention_scheduler(db.clone(), config.retention_days).await?;

    // Serve
    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        db,
        resolver,
    };
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
