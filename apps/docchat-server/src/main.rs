//! docchat server
//!
//! HTTP front for chat over a document collection. Answers come from the
//! retrieval backend; this server resolves their citations to the chunks
//! they cite and serves the cited PDFs with the passages highlighted.
//!
//! - `POST /chat`: proxy to the backend, returns only cited sources
//! - `POST /api/references`: citation resolution without the backend
//! - `POST /view_highlights`: highlighted PDF for one relevant source
//! - `GET /view_pdf/:blob_name`: original PDF

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use docchat_core::annotate::parse_hex_color;
use docchat_core::{
    FsBlobStore, HighlightOptions, Highlighter, ParserOptions, ReferenceParser, WordWindowChunker,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod backend;
mod error;

use api::{
    handle_chat, handle_health, handle_references, handle_view_highlights, handle_view_pdf,
};
use backend::BackendClient;

/// Command-line arguments for the docchat server
#[derive(Parser, Debug)]
#[command(name = "docchat-server")]
#[command(about = "Citation resolution and PDF highlighting for document chat")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "DOCCHAT_PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "DOCCHAT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding the original PDFs
    #[arg(long, env = "DOCCHAT_BLOB_DIR", default_value = "./pdfs")]
    blob_dir: PathBuf,

    /// Base URL of the retrieval/chat backend
    #[arg(long, env = "BACKEND_BASE_URL")]
    backend_url: Option<String>,

    /// Backend request timeout in seconds
    #[arg(long, env = "DOCCHAT_BACKEND_TIMEOUT_SECS", default_value = "120")]
    backend_timeout_secs: u64,

    /// Highlight timeout in milliseconds
    #[arg(long, env = "DOCCHAT_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "DOCCHAT_RATE_LIMIT", default_value = "10")]
    rate_limit: u32,

    /// Keep each citation on a single line
    #[arg(long, env = "DOCCHAT_LINE_ANCHORED")]
    line_anchored: bool,

    /// Words per page chunk when locating cited text
    #[arg(long, env = "DOCCHAT_CHUNK_WORDS", default_value = "120")]
    chunk_words: usize,

    /// Words shared by consecutive page chunks
    #[arg(long, env = "DOCCHAT_CHUNK_OVERLAP", default_value = "20")]
    chunk_overlap: usize,

    /// Highlight color as hex RGB
    #[arg(long, env = "DOCCHAT_HIGHLIGHT_COLOR", default_value = "#FFFF00")]
    highlight_color: String,

    /// Highlight opacity (0-1)
    #[arg(long, env = "DOCCHAT_HIGHLIGHT_OPACITY", default_value = "0.4")]
    highlight_opacity: f32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

pub type DocHighlighter = Highlighter<FsBlobStore, WordWindowChunker>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub highlighter: Arc<DocHighlighter>,
    pub parser: Arc<ReferenceParser>,
    /// `None` when no backend URL is configured
    pub backend: Option<BackendClient>,
    /// Highlight timeout in milliseconds
    pub timeout_ms: u64,
}

/// Routes without transport middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Citations
        .route("/api/references", post(handle_references))
        .route("/chat", post(handle_chat))
        // Documents
        .route("/view_highlights", post(handle_view_highlights))
        .route("/view_pdf/:blob_name", get(handle_view_pdf))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting docchat server on {}:{}", args.host, args.port);

    let color = parse_hex_color(&args.highlight_color)
        .ok_or_else(|| anyhow!("Invalid highlight color '{}'", args.highlight_color))?;
    let highlighter = Highlighter::new(
        FsBlobStore::new(&args.blob_dir),
        WordWindowChunker::new(args.chunk_words, args.chunk_overlap),
    )
    .with_options(HighlightOptions {
        color,
        opacity: args.highlight_opacity.clamp(0.0, 1.0),
    });

    let parser = ReferenceParser::new(ParserOptions {
        line_anchored: args.line_anchored,
        ..ParserOptions::default()
    });

    let backend = match args.backend_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Some(BackendClient::new(
            url,
            Duration::from_secs(args.backend_timeout_secs),
        )?),
        _ => {
            warn!("BACKEND_BASE_URL is not set; /chat will answer 503");
            None
        }
    };

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .ok_or_else(|| anyhow!("Failed to create rate limiter config"))?,
    );

    // Create shared state
    let state = AppState {
        highlighter: Arc::new(highlighter),
        parser: Arc::new(parser),
        backend,
        timeout_ms: args.timeout_ms,
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state)
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Serving PDFs from {}", args.blob_dir.display());
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!("Highlight timeout: {}ms", args.timeout_ms);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
