//! The backend seam.
//!
//! Everything above this crate talks to the assistant server through the
//! [`Backend`] trait, so state machines can be driven by scripted doubles in
//! tests and by [`crate::HttpBackend`] in the application.

use std::sync::Arc;

use async_trait::async_trait;
use kiki_core::types::{AttachmentKind, ChatMode, UploadFile};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Server readiness as reported by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"ready"` once the model is loaded, `"loading"` before.
    pub status: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub database: String,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// The assistant server's HTTP API.
///
/// Every call resolves to either the useful payload, a
/// [`ClientError::Reported`] carrying the server's own error text, or a
/// [`ClientError::Transport`] failure. No call retries.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Answer `question` from the contents of `file` alone (`POST /rag_file`).
    async fn rag_file(&self, question: &str, file: &UploadFile) -> Result<String, ClientError>;

    /// Ingest a web page and return its document identifier (`POST /scrape_url_rag`).
    async fn scrape_url(&self, url: &str) -> Result<String, ClientError>;

    /// Answer `question` against a previously scraped document (`POST /query_document`).
    async fn query_document(&self, question: &str, document_id: &str)
        -> Result<String, ClientError>;

    /// One conversational turn (`POST /chat`).
    async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, ClientError>;

    /// Drop server-side conversation memory for one mode, or all of it (`POST /clear`).
    async fn clear(&self, mode: Option<ChatMode>) -> Result<(), ClientError>;

    /// Add a document or image to the knowledge base.
    ///
    /// Returns the server's confirmation message when it sent one.
    async fn upload(
        &self,
        kind: AttachmentKind,
        file: &UploadFile,
    ) -> Result<Option<String>, ClientError>;

    /// `GET /health`.
    async fn health(&self) -> Result<HealthStatus, ClientError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn rag_file(&self, question: &str, file: &UploadFile) -> Result<String, ClientError> {
        (**self).rag_file(question, file).await
    }

    async fn scrape_url(&self, url: &str) -> Result<String, ClientError> {
        (**self).scrape_url(url).await
    }

    async fn query_document(
        &self,
        question: &str,
        document_id: &str,
    ) -> Result<String, ClientError> {
        (**self).query_document(question, document_id).await
    }

    async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, ClientError> {
        (**self).chat(message, mode).await
    }

    async fn clear(&self, mode: Option<ChatMode>) -> Result<(), ClientError> {
        (**self).clear(mode).await
    }

    async fn upload(
        &self,
        kind: AttachmentKind,
        file: &UploadFile,
    ) -> Result<Option<String>, ClientError> {
        (**self).upload(kind, file).await
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        (**self).health().await
    }
}
