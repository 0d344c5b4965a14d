//! Source-collection strategies.
//!
//! The two wizards differ only in what the second stage collects and how the
//! answer is fetched: a document sent with the question in one multipart
//! request, or a URL scraped first and then queried by document id.

use std::fmt::Debug;

use async_trait::async_trait;
use kiki_client::{Backend, ClientError};
use kiki_core::error::ValidationError;
use kiki_core::types::{validate_url, Attachment, AttachmentKind, FlowKind, UploadFile};

#[async_trait]
pub trait SourceStrategy: Send + Sync {
    /// What the second stage collects.
    type Source: Clone + Debug + Send + Sync;

    fn kind(&self) -> FlowKind;

    /// Noun used in the "provide both a question and a ..." notice.
    fn noun(&self) -> &'static str;

    /// Status line shown while the answer is being fetched.
    fn analyzing_text(&self) -> &'static str;

    /// Check a candidate source, returning the normalised value to store.
    fn validate(&self, source: Self::Source) -> Result<Self::Source, ValidationError>;

    /// Short human-readable description of a stored source.
    fn describe(&self, source: &Self::Source) -> String;

    /// Fetch the answer to `question` from `source`.
    async fn fetch_answer(
        &self,
        backend: &dyn Backend,
        question: &str,
        source: &Self::Source,
    ) -> Result<String, ClientError>;
}

/// Single-call strategy: the file travels with the question.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

#[async_trait]
impl SourceStrategy for FileSource {
    type Source = UploadFile;

    fn kind(&self) -> FlowKind {
        FlowKind::FileRag
    }

    fn noun(&self) -> &'static str {
        "file"
    }

    fn analyzing_text(&self) -> &'static str {
        "Kiki is analyzing your document..."
    }

    fn validate(&self, source: UploadFile) -> Result<UploadFile, ValidationError> {
        Attachment::validate(AttachmentKind::Document, Some(source)).map(|a| a.file)
    }

    fn describe(&self, source: &UploadFile) -> String {
        source.name.clone()
    }

    async fn fetch_answer(
        &self,
        backend: &dyn Backend,
        question: &str,
        source: &UploadFile,
    ) -> Result<String, ClientError> {
        backend.rag_file(question, source).await
    }
}

/// Two-call strategy: scrape the page for a document id, then query it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlSource;

#[async_trait]
impl SourceStrategy for UrlSource {
    type Source = String;

    fn kind(&self) -> FlowKind {
        FlowKind::UrlRag
    }

    fn noun(&self) -> &'static str {
        "URL"
    }

    fn analyzing_text(&self) -> &'static str {
        "Kiki is analyzing the webpage..."
    }

    fn validate(&self, source: String) -> Result<String, ValidationError> {
        validate_url(&source)?;
        Ok(source.trim().to_string())
    }

    fn describe(&self, source: &String) -> String {
        source.clone()
    }

    async fn fetch_answer(
        &self,
        backend: &dyn Backend,
        question: &str,
        source: &String,
    ) -> Result<String, ClientError> {
        // A failed scrape ends the flow; the query is never attempted.
        let document_id = backend.scrape_url(source).await?;
        tracing::debug!(%document_id, "Page scraped");
        backend.query_document(question, &document_id).await
    }
}
