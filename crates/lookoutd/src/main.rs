//! LookOut daemon - traffic incident pipeline over HTTP.

use anyhow::Result;
use lookout_shared::VERSION;
use lookoutd::config::LookoutConfig;
use lookoutd::server::{self, AppState};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("lookoutd v{} starting", VERSION);

    let config = LookoutConfig::load();
    let pipeline = lookoutd::build_pipeline(&config).await?;

    // Readiness waits for the vector index; requests never do
    let backend = pipeline.vectors().initialize().await;
    info!("Vector backend: {:?}", backend);

    server::run(
        AppState::new(pipeline),
        &config.server.bind_addr,
        config.server.max_body_bytes,
    )
    .await?;

    info!("lookoutd stopped");
    Ok(())
}
