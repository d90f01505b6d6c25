//! Invoice Server
//!
//! Upload a PDF invoice, get the VAT rate printed on it removed from every
//! price, download the updated document.
//!
//! - `POST /api/process` runs the automatic pipeline of `invoice-core`
//! - `GET /api/download/:token` serves the result for a limited time

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod state;
#[cfg(test)]
mod tests;

use api::{handle_download, handle_health, handle_process};
use state::AppState;

/// Command-line arguments for the invoice server
#[derive(Parser, Debug)]
#[command(name = "invoice-server")]
#[command(about = "HTTP server for automatic VAT removal on PDF invoices")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Also write updated documents to this directory
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// How long a download link stays valid, in seconds
    #[arg(long, env = "DOWNLOAD_TTL_SECS", default_value = "3600")]
    download_ttl_secs: u64,

    /// Largest accepted upload in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "20")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the router
/// Megabytes to bytes, capped at `usize::MAX`
pub fn upload_limit_bytes(megabytes: usize) -> usize {
    megabytes.saturating_mul(1024 * 1024)
}

pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/process", post(handle_process))
        .route("/api/download/:token", get(handle_download))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let state = AppState::new(
        Duration::from_secs(args.download_ttl_secs),
        args.output_dir.clone(),
    );
    let app = app(state, upload_limit_bytes(args.max_upload_mb));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Download links valid for {}s", args.download_ttl_secs);
    if let Some(dir) = &args.output_dir {
        info!("Writing updated documents to {}", dir.display());
    }

    axum::serve(listener, app).await?;

    Ok(())
}
