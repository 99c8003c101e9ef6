//! help-ai - conversational assistant server and terminal client
//!
//! The core is a message lifecycle engine that shows optimistic entries
//! while an exchange is in flight and reconciles them with the
//! server-confirmed records once it resolves.

mod api;
mod assistant;
mod client;
mod config;
mod db;
mod repl;
mod runtime;
mod state_machine;
mod store;
mod transport;

use api::{create_router, AppState};
use config::{ClientConfig, ServerConfig};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage:
  help-ai [serve]            run the HTTP server
  help-ai chat [id]          chat in the terminal, optionally opening conversation <id>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("chat") => {
            let open = args
                .get(1)
                .map(|id| id.parse())
                .transpose()
                .map_err(|_| format!("Invalid conversation id\n{USAGE}"))?;
            init_terminal_logging();
            repl::run(ClientConfig::from_env(), open).await
        }
        Some("-h" | "--help" | "help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => Err(format!("Unknown command: {other}\n{USAGE}").into()),
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "help_ai=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env();

    let storage = store::open_storage(&config.store)?;
    let assistant = assistant::build_assistant(&config.assistant)?;
    tracing::info!(model = %assistant.model_id(), "Assistant initialized");

    let state = AppState::new(storage, assistant);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("help-ai server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The terminal owns stdout, so logs go to stderr and stay quiet by default
fn init_terminal_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}
