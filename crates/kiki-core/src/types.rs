use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KikiError, Result, ValidationError};

// =============================================================================
// Constants
// =============================================================================

/// Document extensions accepted for RAG files and document attachments.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".docx", ".pptx", ".csv", ".xlsx", ".xls"];

/// Image extensions accepted for image attachments.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".avif",
];

const DOCUMENT_TYPES_TEXT: &str =
    "PDF, Word (.docx), PowerPoint (.pptx), Excel (.xlsx, .xls), or CSV";
const IMAGE_TYPES_TEXT: &str = "jpg, jpeg, png, gif, bmp, tiff, webp, avif";

// =============================================================================
// Enums
// =============================================================================

/// Conversation mode: plain chat or retrieval-augmented chat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Plain question answering without the knowledge base.
    Chat,
    /// Answers grounded in the backend's document store (default).
    #[default]
    Rag,
}

impl ChatMode {
    /// Value of the `use_rag` flag sent to the chat endpoint.
    pub fn use_rag(&self) -> bool {
        matches!(self, ChatMode::Rag)
    }

    /// Name the bot answers under in this mode.
    pub fn bot_label(&self) -> &'static str {
        match self {
            ChatMode::Chat => "Chat Kiki",
            ChatMode::Rag => "Rag Kiki",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Chat => "chat",
            ChatMode::Rag => "rag",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = KikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(ChatMode::Chat),
            "rag" => Ok(ChatMode::Rag),
            other => Err(KikiError::Config(format!("unknown chat mode: {}", other))),
        }
    }
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

/// What an attachment is uploaded as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Document,
    Image,
}

impl AttachmentKind {
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            AttachmentKind::Document => DOCUMENT_EXTENSIONS,
            AttachmentKind::Image => IMAGE_EXTENSIONS,
        }
    }

    fn supported_text(&self) -> &'static str {
        match self {
            AttachmentKind::Document => DOCUMENT_TYPES_TEXT,
            AttachmentKind::Image => IMAGE_TYPES_TEXT,
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentKind::Document => write!(f, "document"),
            AttachmentKind::Image => write!(f, "image"),
        }
    }
}

/// Which query-then-source flow a wizard instance runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    FileRag,
    UrlRag,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::FileRag => write!(f, "file_rag"),
            FlowKind::UrlRag => write!(f, "url_rag"),
        }
    }
}

/// Stage of a query-then-source wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStage {
    AwaitingQuery,
    AwaitingSource,
    ShowingResult,
}

impl WizardStage {
    pub const ALL: [WizardStage; 3] = [
        WizardStage::AwaitingQuery,
        WizardStage::AwaitingSource,
        WizardStage::ShowingResult,
    ];

    pub fn index(&self) -> usize {
        match self {
            WizardStage::AwaitingQuery => 0,
            WizardStage::AwaitingSource => 1,
            WizardStage::ShowingResult => 2,
        }
    }

    /// Strictly one stage forward, or back from source entry to query entry.
    pub fn can_transition_to(&self, target: &WizardStage) -> bool {
        matches!(
            (self, target),
            (WizardStage::AwaitingQuery, WizardStage::AwaitingSource)
                | (WizardStage::AwaitingSource, WizardStage::ShowingResult)
                | (WizardStage::AwaitingSource, WizardStage::AwaitingQuery)
        )
    }

    /// Progress indicator with this stage active and earlier stages completed.
    pub fn progress(&self) -> [StageMarker; 3] {
        let current = self.index();
        let mut markers = [StageMarker::Inactive; 3];
        for (i, marker) in markers.iter_mut().enumerate() {
            *marker = match i.cmp(&current) {
                std::cmp::Ordering::Less => StageMarker::Completed,
                std::cmp::Ordering::Equal => StageMarker::Active,
                std::cmp::Ordering::Greater => StageMarker::Inactive,
            };
        }
        markers
    }
}

impl fmt::Display for WizardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardStage::AwaitingQuery => write!(f, "AwaitingQuery"),
            WizardStage::AwaitingSource => write!(f, "AwaitingSource"),
            WizardStage::ShowingResult => write!(f, "ShowingResult"),
        }
    }
}

/// Progress indicator marking for one wizard stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageMarker {
    #[default]
    Inactive,
    Active,
    Completed,
}

/// What a pending request slot is busy with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "activity")]
pub enum Activity {
    Chat,
    Upload { kind: AttachmentKind },
    Wizard { flow: FlowKind },
}

/// How a backend request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Success,
    ReportedError,
    TransportError,
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Unique identifier for a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unix timestamp in milliseconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One entry of the conversation transcript. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    /// Display name: "You" for the user, the mode's bot label otherwise.
    pub label: String,
    pub text: String,
    pub rendered_at: Timestamp,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            label: "You".to_string(),
            text: text.into(),
            rendered_at: Timestamp::now(),
        }
    }

    /// A bot message labelled for the mode in effect when it is appended.
    pub fn bot(text: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Bot,
            label: mode.bot_label().to_string(),
            text: text.into(),
            rendered_at: Timestamp::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

/// Sidebar entry registered after a conversation's first exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub active: bool,
}

/// Title for a conversation: the first `max_chars` characters, ellipsized if longer.
pub fn summary_title(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

// =============================================================================
// Files and attachments
// =============================================================================

/// A file picked by the user, held in memory until submitted.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| KikiError::Io(std::io::Error::other("path has no file name")))?;
        Ok(Self { name, bytes })
    }
}

/// Check a file name against an allowed-extension set, case-insensitively.
pub fn has_allowed_extension(name: &str, allowed: &[&str]) -> bool {
    match name.rfind('.') {
        Some(idx) => {
            let ext = name[idx..].to_ascii_lowercase();
            allowed.iter().any(|a| *a == ext)
        }
        None => false,
    }
}

/// A file validated for upload as a document or an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file: UploadFile,
    pub validated: bool,
}

impl Attachment {
    /// Validate `file` against the extension set of `kind`.
    pub fn validate(
        kind: AttachmentKind,
        file: Option<UploadFile>,
    ) -> std::result::Result<Self, ValidationError> {
        let file = file.ok_or(ValidationError::MissingFile)?;
        if file.name.is_empty() {
            return Err(ValidationError::MissingFile);
        }
        if !has_allowed_extension(&file.name, kind.allowed_extensions()) {
            return Err(ValidationError::UnsupportedFileType {
                name: file.name,
                supported: kind.supported_text(),
            });
        }
        Ok(Self {
            kind,
            file,
            validated: true,
        })
    }
}

/// Accept only URLs with an `http://` or `https://` scheme prefix.
pub fn validate_url(url: &str) -> std::result::Result<(), ValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::MalformedUrl(url.to_string()));
    }
    Ok(())
}
