//! # reelsmithd
//!
//! HTTP job service for the Reelsmith pipeline. Jobs run in the background;
//! clients poll `/api/status/:id` and download finished videos.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use reelsmith_core::pipeline::StudioFactory;
use reelsmith_core::StudioConfig;

mod api;
mod state;

use state::AppState;

#[derive(Parser)]
#[command(name = "reelsmithd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reelsmith HTTP job service", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "REELSMITH_LISTEN", default_value = "0.0.0.0:5000")]
    listen: SocketAddr,

    /// Path to a TOML config file
    #[arg(short, long, env = "REELSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

/// Build the API router.
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health::health_check))
        .route("/api/generate", post(api::jobs::generate))
        .route("/api/status/:id", get(api::jobs::status))
        .route("/api/jobs", get(api::jobs::list))
        .route("/api/jobs/:id", delete(api::jobs::delete))
        .route("/api/videos", get(api::videos::list))
        .route("/api/videos/:job/:name", get(api::videos::download))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn run_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reelsmith_core::init_tracing(cli.json, level);

    let config = StudioConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        version = reelsmith_core::VERSION,
        workspace = %config.workspace.display(),
        "reelsmithd starting"
    );
    let factory = StudioFactory::new(config).context("Failed to prepare workspace")?;

    run_server(cli.listen, AppState::from_factory(factory)).await
}
