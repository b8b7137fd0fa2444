//! Markdown Translator Web - JSON API server for translating Markdown documents.

mod helpers;
mod routes;
mod state;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use md_translator_core::{Provider, WorkbenchConfig};
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "md-translator-web")]
#[command(author, version, about = "Markdown Translator Web Server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// LLM provider (openai, anthropic, ollama, custom)
    #[arg(long, env = "MD_TRANSLATOR_PROVIDER", default_value = "custom")]
    provider: String,

    /// API base URL (default depends on provider)
    #[arg(long, env = "MD_TRANSLATOR_API_BASE")]
    api_base: Option<String>,

    /// API key
    #[arg(long, env = "MD_TRANSLATOR_API_KEY")]
    api_key: Option<String>,

    /// Model name
    #[arg(long, env = "MD_TRANSLATOR_MODEL", default_value = "default_model")]
    model: String,

    /// Config file path
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_provider(name: &str) -> Result<Provider> {
    match name {
        "openai" => Ok(Provider::OpenAi),
        "anthropic" => Ok(Provider::Anthropic),
        "ollama" => Ok(Provider::Ollama),
        "custom" => Ok(Provider::Custom),
        other => anyhow::bail!("Unknown provider: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging with env-filter overrides
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Base config from file, overridden by CLI arguments
    let mut config = if let Some(config_path) = &args.config {
        WorkbenchConfig::from_file(config_path)?
    } else {
        WorkbenchConfig::load()
    };
    config.client.provider = parse_provider(&args.provider)?;
    if args.api_base.is_some() {
        config.client.api_base = args.api_base.clone();
    }
    if args.api_key.is_some() {
        config.client.api_key = args.api_key.clone();
    }
    config.client.model = args.model.clone();

    let state = Arc::new(AppState::new(config));

    // Spawn background task for session cleanup (runs every 5 minutes)
    let cleanup_state = Arc::clone(&state);
    tokio::spawn(async move {
        let cleanup_interval = Duration::from_secs(5 * 60);
        loop {
            tokio::time::sleep(cleanup_interval).await;
            cleanup_state.cleanup_old_sessions().await;
            info!("Completed session cleanup");
        }
    });

    // Build router
    let app = Router::new()
        .route("/api/upload", post(routes::upload_document))
        .route("/api/units/{session_id}", get(routes::list_units))
        .route("/api/units/{session_id}/{unit_id}", put(routes::update_unit))
        .route(
            "/api/translate/{session_id}/{unit_id}",
            post(routes::toggle_unit_job),
        )
        .route("/api/batch/{session_id}/start", post(routes::start_batch))
        .route("/api/batch/{session_id}/stop", post(routes::stop_batch))
        .route("/api/batch/{session_id}/stream", get(routes::batch_stream))
        .route("/api/export/{session_id}", get(routes::export_document))
        .route(
            "/api/progress/{session_id}",
            get(routes::get_progress).post(routes::load_progress),
        )
        .route("/api/settings/{session_id}", post(routes::update_settings))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(50 * 1024 * 1024)), // 50MB limit for uploads
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
