//! API handlers for the docchat server
//!
//! Provides REST endpoints for:
//! - Citation resolution against retrieved chunks
//! - Chat, proxied to the retrieval backend
//! - Highlighted and raw PDF delivery

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use docchat_core::{
    get_relevant_sources, BlobStore, HighlightSource, OcrLayout, PdfReferences, ReferenceParser,
    RelevantSource, SourceChunk,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{debug, info};

use crate::backend::ChatRequest;
use crate::error::ServerError;
use crate::AppState;

const X_PAGE_NUMBER: HeaderName = HeaderName::from_static("x-page-number");
const X_HIGHLIGHT_FOUND: HeaderName = HeaderName::from_static("x-highlight-found");

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "docchat-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Parse citations from `references`, or from `answer` when there is no
/// separate citation block, and keep the chunks they cite.
fn resolve_citations(
    parser: &ReferenceParser,
    references: &str,
    answer: &str,
    chunks: &[SourceChunk],
) -> (PdfReferences, Vec<RelevantSource>) {
    let text = if references.trim().is_empty() {
        answer
    } else {
        references
    };
    let refs = parser.parse(text);
    let sources = get_relevant_sources(&refs, chunks);
    debug!(
        "Resolved {} cited files to {} relevant sources",
        refs.len(),
        sources.len()
    );
    (refs, sources)
}

/// Citation resolution request
#[derive(Deserialize)]
pub struct ReferencesRequest {
    #[serde(default)]
    pub references: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub source_documents: Vec<SourceChunk>,
}

#[derive(Serialize)]
pub struct ReferencesResponse {
    pub references: PdfReferences,
    pub source_documents: Vec<RelevantSource>,
}

/// Handler: POST /api/references
pub async fn handle_references(
    State(state): State<AppState>,
    Json(req): Json<ReferencesRequest>,
) -> Json<ReferencesResponse> {
    let (references, source_documents) = resolve_citations(
        &state.parser,
        &req.references,
        &req.answer,
        &req.source_documents,
    );
    Json(ReferencesResponse {
        references,
        source_documents,
    })
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub question: String,
    pub timestamp: String,
    pub source_documents: Vec<RelevantSource>,
}

/// Handler: POST /chat
pub async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    let req = req.trimmed();
    if req.question.is_empty() {
        return Err(ServerError::InvalidRequest(
            "Please provide a question".to_string(),
        ));
    }
    let backend = state
        .backend
        .as_ref()
        .ok_or(ServerError::BackendUnavailable)?;

    info!("Chat request: {} selected files", req.file_names.len());
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let reply = backend.chat(&req, authorization).await?;

    let (_, source_documents) = resolve_citations(
        &state.parser,
        &reply.references,
        &reply.answer,
        &reply.source_documents,
    );

    Ok(Json(ChatResponse {
        answer: reply.answer,
        question: req.question,
        timestamp: reply.timestamp,
        source_documents,
    }))
}

/// Highlight request: a relevant source as returned by `/chat`
#[derive(Deserialize)]
pub struct ViewHighlightsRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub page_number: Vec<u32>,
    #[serde(default)]
    pub pages_content: Option<OcrLayout>,
    #[serde(default = "default_try_highlight")]
    pub try_highlight: bool,
}

fn default_try_highlight() -> bool {
    true
}

impl ViewHighlightsRequest {
    fn validate(&self) -> Result<(), ServerError> {
        for (field, missing) in [
            ("filename", self.filename.trim().is_empty()),
            ("page_number", self.page_number.is_empty()),
            ("content", self.content.is_empty()),
        ] {
            if missing {
                return Err(ServerError::InvalidRequest(format!(
                    "Missing required field: {}",
                    field
                )));
            }
        }
        if self.content.len() != self.page_number.len() {
            return Err(ServerError::InvalidRequest(format!(
                "content has {} entries but page_number has {}",
                self.content.len(),
                self.page_number.len()
            )));
        }
        Ok(())
    }
}

/// `inline; filename="<name>"` with the path and any quotes removed
pub(crate) fn inline_disposition(filename: &str) -> String {
    let name = docchat_core::sources::strip_path(filename).replace('"', "");
    format!("inline; filename=\"{}\"", name)
}

/// Handler: POST /view_highlights
pub async fn handle_view_highlights(
    State(state): State<AppState>,
    Json(req): Json<ViewHighlightsRequest>,
) -> Result<Response, ServerError> {
    req.validate()?;

    let first_page = req.page_number[0];
    let try_highlight = req.try_highlight;
    let disposition = inline_disposition(&req.filename);
    let source = HighlightSource::from(RelevantSource {
        filename: req.filename,
        content: req.content,
        page_number: req.page_number,
        pages_content: req.pages_content,
        extra: Map::new(),
    });

    info!(
        "Highlight request: file={}, targets={}, try_highlight={}",
        source.filename,
        source.targets.len(),
        try_highlight
    );

    let highlighter = state.highlighter.clone();
    let task = tokio::task::spawn_blocking(move || highlighter.highlight(&source, try_highlight));
    let outcome = tokio::time::timeout(Duration::from_millis(state.timeout_ms), task)
        .await
        .map_err(|_| ServerError::Timeout(state.timeout_ms))?
        .map_err(|e| ServerError::Internal(format!("Highlight task failed: {}", e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (X_PAGE_NUMBER, first_page.to_string()),
            (X_HIGHLIGHT_FOUND, outcome.found.to_string()),
        ],
        outcome.pdf,
    )
        .into_response())
}

/// Handler: GET /view_pdf/:blob_name
pub async fn handle_view_pdf(
    State(state): State<AppState>,
    Path(blob_name): Path<String>,
) -> Result<Response, ServerError> {
    debug!("View PDF: {}", blob_name);

    let highlighter = state.highlighter.clone();
    let name = blob_name.clone();
    let bytes = tokio::task::spawn_blocking(move || highlighter.store().fetch(&name))
        .await
        .map_err(|e| ServerError::Internal(format!("Blob task failed: {}", e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, inline_disposition(&blob_name)),
        ],
        bytes,
    )
        .into_response())
}
