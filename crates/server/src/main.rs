use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trawl_core::{
    load_config, validate_config, HttpClientFactory, KeywordFilter, MemorySessionStore,
    SearchCoordinator, SessionStore, SourceCatalog, SqliteSessionStore,
};
use trawl_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("TRAWL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration loaded");

    let catalog = SourceCatalog::from_file(&config.catalog.path, &config.sources)
        .with_context(|| format!("Failed to load source catalog {:?}", config.catalog.path))?;
    let enabled = catalog.entries().filter(|e| e.enabled).count();
    info!(
        sources = catalog.len(),
        enabled, "Source catalog loaded"
    );

    let sessions: Arc<dyn SessionStore> = match &config.sessions.path {
        Some(path) => {
            info!("Persisting sessions to {:?}", path);
            Arc::new(SqliteSessionStore::new(path).context("Failed to open session store")?)
        }
        None => {
            info!("Keeping sessions in memory");
            Arc::new(MemorySessionStore::new())
        }
    };

    let clients = HttpClientFactory::new(
        config.search.request_timeout(),
        config.search.user_agent.clone(),
    );
    let coordinator = SearchCoordinator::new(
        Arc::new(catalog),
        Arc::new(KeywordFilter::new(config.filter.clone())),
        Arc::new(clients),
        sessions,
        &config.search,
    );
    info!(
        timeout_ms = coordinator.timeout().as_millis() as u64,
        "Search coordinator ready"
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, Arc::new(coordinator)));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

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
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
