use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coach::coach::Coach;
use coach::config::Config;
use coach::remote::HttpRemote;
use coach::routes::build_router;
use coach::state::AppState;
use coach::store::FileBlobStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting coach v{}", env!("CARGO_PKG_VERSION"));

    // Durable on-device state: completed units, action queue, content cache
    let store = Arc::new(FileBlobStore::open(&config.store_dir).await?);
    info!("Local store at {}", store.root().display());

    let remote = Arc::new(HttpRemote::new(&config.remote_url)?);
    info!("Remote backend: {}", config.remote_url);

    let coach = Coach::start(store, remote, config.tuning, config.mismatch_policy).await?;
    info!("Mismatch policy: {:?}", config.mismatch_policy);

    let state = AppState {
        coach: Arc::new(coach),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("127.0.0.1:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
