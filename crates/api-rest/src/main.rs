//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the medical data REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `hc-run` binary serves the same
//! router and is what deployments run.

use api_rest::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// # Environment Variables
/// - `HC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `HC_DATA_DIR`, `HC_MAX_DATA_SOURCES`, `API_KEY`: see [`AppState::from_env`]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("hc_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("HC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting Health Connect REST API on {}", addr);

    let app = router(AppState::from_env()?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
