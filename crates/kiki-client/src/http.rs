//! reqwest implementation of [`Backend`].

use std::time::Duration;

use async_trait::async_trait;
use kiki_core::config::BackendConfig;
use kiki_core::types::{AttachmentKind, ChatMode, UploadFile};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{Backend, HealthStatus};
use crate::error::ClientError;

/// `{success, answer | document_id | message, error}` as returned by the
/// RAG and upload endpoints, on success and failure alike.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    document_id: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Envelope {
    /// Turn a `success: false` payload into a reported error.
    fn check(self) -> Result<Self, ClientError> {
        if self.success {
            Ok(self)
        } else {
            Err(ClientError::Reported(
                self.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

/// `{response, error}` from `/chat`. `error` is `null` on success.
#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the assistant server.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for `base_url` (including the `/api` prefix).
    ///
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ClientError> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Response, ClientError> {
        debug!(endpoint, "POST");
        Ok(self.client.post(self.url(endpoint)).json(body).send().await?)
    }

    async fn post_form(&self, endpoint: &str, form: Form) -> Result<Response, ClientError> {
        debug!(endpoint, "POST multipart");
        Ok(self
            .client
            .post(self.url(endpoint))
            .multipart(form)
            .send()
            .await?)
    }
}

fn file_part(file: &UploadFile) -> Part {
    Part::bytes(file.bytes.clone()).file_name(file.name.clone())
}

/// Parse an [`Envelope`] regardless of status code. These endpoints send
/// their JSON failure payload with 4xx/5xx statuses.
async fn read_envelope(resp: Response) -> Result<Envelope, ClientError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    serde_json::from_slice::<Envelope>(&body).map_err(|e| unreadable(status, e))
}

fn unreadable(status: StatusCode, err: serde_json::Error) -> ClientError {
    ClientError::Transport(format!("unreadable response (HTTP {}): {}", status, err))
}

fn missing(field: &str) -> ClientError {
    ClientError::Transport(format!("response is missing `{}`", field))
}

fn document_id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn rag_file(&self, question: &str, file: &UploadFile) -> Result<String, ClientError> {
        let form = Form::new()
            .part("file", file_part(file))
            .text("question", question.to_string());
        let resp = self.post_form("rag_file", form).await?;
        read_envelope(resp)
            .await?
            .check()?
            .answer
            .ok_or_else(|| missing("answer"))
    }

    async fn scrape_url(&self, url: &str) -> Result<String, ClientError> {
        let resp = self.post_json("scrape_url_rag", &json!({ "url": url })).await?;
        read_envelope(resp)
            .await?
            .check()?
            .document_id
            .and_then(document_id_string)
            .ok_or_else(|| missing("document_id"))
    }

    async fn query_document(
        &self,
        question: &str,
        document_id: &str,
    ) -> Result<String, ClientError> {
        let body = json!({ "question": question, "document_id": document_id });
        let resp = self.post_json("query_document", &body).await?;
        read_envelope(resp)
            .await?
            .check()?
            .answer
            .ok_or_else(|| missing("answer"))
    }

    async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, ClientError> {
        let body = json!({ "message": message, "use_rag": mode.use_rag() });
        let resp = self.post_json("chat", &body).await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        match serde_json::from_slice::<ChatEnvelope>(&bytes) {
            Ok(ChatEnvelope {
                error: Some(error), ..
            }) if !error.is_empty() => Err(ClientError::Reported(error)),
            Ok(_) if !status.is_success() => {
                Err(ClientError::Transport(format!("HTTP {}", status)))
            }
            Ok(ChatEnvelope { response, .. }) => response.ok_or_else(|| missing("response")),
            Err(e) => Err(unreadable(status, e)),
        }
    }

    async fn clear(&self, mode: Option<ChatMode>) -> Result<(), ClientError> {
        let body = match mode {
            Some(mode) => json!({ "mode": mode.as_str() }),
            None => json!({}),
        };
        let resp = self.post_json("clear", &body).await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Transport(format!("HTTP {}", status)))
        }
    }

    async fn upload(
        &self,
        kind: AttachmentKind,
        file: &UploadFile,
    ) -> Result<Option<String>, ClientError> {
        let (endpoint, field) = match kind {
            AttachmentKind::Document => ("upload_pdf", "file"),
            AttachmentKind::Image => ("upload_image", "image"),
        };
        let form = Form::new().part(field, file_part(file));
        let resp = self.post_form(endpoint, form).await?;
        Ok(read_envelope(resp).await?.check()?.message)
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        debug!(endpoint = "health", "GET");
        let resp = self.client.get(self.url("health")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Transport(format!("HTTP {}", status)));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| unreadable(status, e))
    }
}
