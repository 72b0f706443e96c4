use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};

/// Main entry point for the Health Connect medical data service
///
/// Resolves configuration once, opens the medical store and serves the REST API until the
/// process receives Ctrl-C.
///
/// # Environment Variables
/// - `HC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `HC_DATA_DIR`: storage root (default: "health_data")
/// - `HC_MAX_DATA_SOURCES`: per-package data source limit (default: 20)
/// - `API_KEY`: API key every protected endpoint requires
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hc_run=info".parse()?)
                .add_directive("hc_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr: SocketAddr = std::env::var("HC_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;

    let state = AppState::from_env()?;
    tracing::info!("++ Starting Health Connect REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down");
        })
        .await?;

    Ok(())
}
