//! Client for the retrieval/chat backend

use std::time::Duration;

use axum::http::StatusCode;
use docchat_core::SourceChunk;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ServerError;

/// Body forwarded to `<backend>/chat`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub file_names: Vec<String>,
}

impl ChatRequest {
    /// Copy with surrounding whitespace removed from every text field
    pub fn trimmed(&self) -> Self {
        Self {
            question: self.question.trim().to_string(),
            user_id: self.user_id.trim().to_string(),
            conversation_id: self.conversation_id.trim().to_string(),
            session_id: self.session_id.trim().to_string(),
            file_names: self.file_names.clone(),
        }
    }
}

/// The fields of the backend's chat reply that the server uses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendAnswer {
    #[serde(default)]
    pub answer: String,
    /// Citation block; may be empty when citations are inline in `answer`
    #[serde(default)]
    pub references: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub source_documents: Vec<SourceChunk>,
}

#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat(
        &self,
        request: &ChatRequest,
        authorization: Option<&str>,
    ) -> Result<BackendAnswer, ServerError> {
        let url = format!("{}/chat", self.base_url);
        debug!("Forwarding chat request to {}", url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(auth) = authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ServerError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = response
                .json::<Value>()
                .await
                .unwrap_or_else(|_| json!({ "error": format!("backend returned {}", status) }));
            return Err(ServerError::BackendStatus { status, body });
        }

        response
            .json::<BackendAnswer>()
            .await
            .map_err(|e| ServerError::Backend(format!("invalid chat response: {}", e)))
    }
}
