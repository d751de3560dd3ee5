use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use f3d_server::config::ServerConfig;
use f3d_server::{app, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::load()?;
    let state = build_state(&config)?;
    let app = app(state);

    let addr = SocketAddr::from((config.host, config.port));
    info!(%addr, storage_root = %config.storage_root.display(), "starting forge3d API server");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
