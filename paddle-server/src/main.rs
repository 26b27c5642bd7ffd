//! Server entry point.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paddle_arena::{GameServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!("starting paddle arena server v{}", paddle_arena::VERSION);

    let server = GameServer::new(config);
    server.run().await?;

    Ok(())
}
