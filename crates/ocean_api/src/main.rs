use anyhow::Context;
use clap::Parser;
use etrel_ocean::{AppState, BridgeConfig};
use ocean_api::create_app;
use ocean_client::OceanClient;
use ocean_engine::{Bridge, JsonFileStore, MemoryStore, StateStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Command line arguments for the etrel-ocean bridge
#[derive(Parser, Debug)]
#[command(name = "etrel-ocean")]
#[command(about = "Bridge between a home-automation host and the Etrel OCEAN charging cloud")]
struct Args {
    /// Path to the bridge configuration JSON file
    #[arg(short, long)]
    config: PathBuf,

    /// Port to bind the server to, overriding the configured listen address
    #[arg(short, long)]
    port: Option<u16>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BridgeConfig::load(&args.config).await?;
    tracing::info!(
        "Loaded bridge config from {}: home code {:?}",
        args.config.display(),
        config.home_code()
    );

    let client = OceanClient::new(&config.base_url, &config.email, &config.password)
        .context("Failed to create vendor client")?;
    let store: Arc<dyn StateStore> = match &config.state_file {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let bridge = Bridge::start(config.engine_settings(), Arc::new(client), store)
        .await
        .context("Bridge setup failed")?;

    let mut events = bridge.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!("Bridge event: {}", json),
                    Err(e) => tracing::warn!("Unserializable bridge event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log fell behind, skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let app = create_app(AppState::from_bridge(config.clone(), &bridge));

    let bind_addr = config.listen_addr(args.port)?;
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    bridge.shutdown().await;
    Ok(())
}
