//! Scripted in-memory backend for driving state machines in tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kiki_core::types::{AttachmentKind, ChatMode, UploadFile};

use crate::backend::{Backend, HealthStatus};
use crate::error::ClientError;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RagFile { question: String, file_name: String },
    ScrapeUrl { url: String },
    QueryDocument { question: String, document_id: String },
    Chat { message: String, mode: ChatMode },
    Clear { mode: Option<ChatMode> },
    Upload { kind: AttachmentKind, file_name: String },
    Health,
}

impl Call {
    /// Endpoint name without the `/api` prefix.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Call::RagFile { .. } => "rag_file",
            Call::ScrapeUrl { .. } => "scrape_url_rag",
            Call::QueryDocument { .. } => "query_document",
            Call::Chat { .. } => "chat",
            Call::Clear { .. } => "clear",
            Call::Upload {
                kind: AttachmentKind::Document,
                ..
            } => "upload_pdf",
            Call::Upload {
                kind: AttachmentKind::Image,
                ..
            } => "upload_image",
            Call::Health => "health",
        }
    }
}

#[derive(Debug, Clone)]
struct Script {
    rag_file: Result<String, ClientError>,
    scrape: Result<String, ClientError>,
    query: Result<String, ClientError>,
    chat: Result<String, ClientError>,
    clear: Result<(), ClientError>,
    upload: Result<Option<String>, ClientError>,
    latency: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            rag_file: Ok("answer".to_string()),
            scrape: Ok("doc-1".to_string()),
            query: Ok("answer".to_string()),
            chat: Ok("ok".to_string()),
            clear: Ok(()),
            upload: Ok(None),
            latency: Duration::ZERO,
        }
    }
}

/// A [`Backend`] that answers every call from a fixed script and records it.
#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rag_file(self, reply: Result<String, ClientError>) -> Self {
        self.script().rag_file = reply;
        self
    }

    pub fn with_scrape(self, reply: Result<String, ClientError>) -> Self {
        self.script().scrape = reply;
        self
    }

    pub fn with_query(self, reply: Result<String, ClientError>) -> Self {
        self.script().query = reply;
        self
    }

    pub fn with_chat(self, reply: Result<String, ClientError>) -> Self {
        self.script().chat = reply;
        self
    }

    pub fn with_clear(self, reply: Result<(), ClientError>) -> Self {
        self.script().clear = reply;
        self
    }

    pub fn with_upload(self, reply: Result<Option<String>, ClientError>) -> Self {
        self.script().upload = reply;
        self
    }

    /// Delay every reply by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.script().latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of recorded calls to `endpoint`.
    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .count()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn record(&self, call: Call) -> Script {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        let script = self.script().clone();
        if !script.latency.is_zero() {
            tokio::time::sleep(script.latency).await;
        }
        script
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn rag_file(&self, question: &str, file: &UploadFile) -> Result<String, ClientError> {
        self.record(Call::RagFile {
            question: question.to_string(),
            file_name: file.name.clone(),
        })
        .await
        .rag_file
    }

    async fn scrape_url(&self, url: &str) -> Result<String, ClientError> {
        self.record(Call::ScrapeUrl {
            url: url.to_string(),
        })
        .await
        .scrape
    }

    async fn query_document(
        &self,
        question: &str,
        document_id: &str,
    ) -> Result<String, ClientError> {
        self.record(Call::QueryDocument {
            question: question.to_string(),
            document_id: document_id.to_string(),
        })
        .await
        .query
    }

    async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, ClientError> {
        self.record(Call::Chat {
            message: message.to_string(),
            mode,
        })
        .await
        .chat
    }

    async fn clear(&self, mode: Option<ChatMode>) -> Result<(), ClientError> {
        self.record(Call::Clear { mode }).await.clear
    }

    async fn upload(
        &self,
        kind: AttachmentKind,
        file: &UploadFile,
    ) -> Result<Option<String>, ClientError> {
        self.record(Call::Upload {
            kind,
            file_name: file.name.clone(),
        })
        .await
        .upload
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.record(Call::Health).await;
        Ok(HealthStatus {
            status: "ready".to_string(),
            model: "mock".to_string(),
            database: "mock".to_string(),
        })
    }
}
