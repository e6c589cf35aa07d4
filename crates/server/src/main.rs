use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookshelf_core::{
    config::CONFIG_ENV, load_config, open_library, validate_config, ProviderFactory,
    ProviderRegistry, ProviderStore, SqliteMetadataStore, StatusStore, StatusTracker,
};
use bookshelf_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Bookshelf metadata server v{}", VERSION);

    // Determine config path
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Provider definitions and status share one SQLite database
    let store = Arc::new(
        SqliteMetadataStore::new(&config.database.path)
            .context("Failed to open metadata store")?,
    );
    info!("Metadata store initialized");

    let tracker = Arc::new(StatusTracker::new(
        Arc::clone(&store) as Arc<dyn StatusStore>,
        config.metadata.backoff.into(),
    ));

    let mut factory = ProviderFactory::new();
    open_library::register(
        &mut factory,
        config
            .metadata
            .open_library
            .clone()
            .with_default_timeout(config.metadata.request_timeout()),
    );

    let registry = Arc::new(ProviderRegistry::new(
        store as Arc<dyn ProviderStore>,
        tracker,
        factory,
        config.metadata.cache.into(),
        config.metadata.request_timeout(),
    ));

    let seeded = registry
        .seed(config.metadata.providers.clone())
        .context("Failed to seed provider definitions")?;
    if seeded > 0 {
        info!("Seeded {} provider definition(s) from config", seeded);
    }

    // Create app state
    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, registry));

    // Create router
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
