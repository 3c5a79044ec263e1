//! QIOS WebSocket gateway
//!
//! Serves the coordination service to nodes and observers.
//!
//! ## Endpoints
//! - `GET /ws`: persistent JSON channel (nodes and observers)
//! - `GET /health`: liveness check, answers `OK`
//!
//! ## Environment Variables
//! - `QIOS_HOST`: Host to bind to (default: 0.0.0.0)
//! - `PORT`: Port to listen on (default: 10000)
//! - `QIOS_CONFIG`: JSON service configuration file
//! - `RUST_LOG`: log filter (default: qios=info)

mod routes;
mod ws;

use anyhow::Context;
use axum::http::Method;
use clap::Parser;
use qios_core::{Coordinator, QiosConfig};
use qios_env::TokioContext;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "qios-server")]
#[command(about = "WebSocket gateway for the QIOS coordination service", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "QIOS_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 10000, env = "PORT")]
    port: u16,

    /// Service configuration file (JSON)
    #[arg(short, long, env = "QIOS_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging for QIOS crates
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<QiosConfig> {
    match path {
        Some(path) => QiosConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(QiosConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "qios=debug,tower_http=debug"
    } else {
        "qios=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(args.config.as_ref())?;
    let coordinator = Arc::new(Coordinator::new(TokioContext::shared(), config));
    coordinator.telemetry().clone().start();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);
    let app = routes::create_router(coordinator)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("QIOS gateway listening on http://{}", addr);
    tracing::info!("  GET /ws     - node and observer channel");
    tracing::info!("  GET /health - health check");

    axum::serve(listener, app).await?;
    Ok(())
}
