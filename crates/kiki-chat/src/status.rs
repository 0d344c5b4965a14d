//! Status lines cycled while a request is pending.

use kiki_core::types::{AttachmentKind, ChatMode};

/// "Thinking" cycle for a chat request in `mode`.
pub fn thinking_messages(mode: ChatMode) -> Vec<String> {
    let first = format!("{} is thinking...", mode.bot_label());
    let rest: &[&str] = match mode {
        ChatMode::Rag => &[
            "Consulting data sources...",
            "Analyzing information...",
            "Preparing response...",
        ],
        ChatMode::Chat => &["Processing your question...", "Generating response..."],
    };
    std::iter::once(first)
        .chain(rest.iter().map(|s| s.to_string()))
        .collect()
}

/// Progress cycle for uploading `file_name` as `kind`.
pub fn upload_messages(kind: AttachmentKind, file_name: &str) -> Vec<String> {
    match kind {
        AttachmentKind::Document => vec![
            format!("Uploading \"{}\"...", file_name),
            "Document is being ingested...".to_string(),
            "Extracting text content...".to_string(),
            "Chunking document...".to_string(),
            "Creating embeddings...".to_string(),
            "Almost done...".to_string(),
        ],
        AttachmentKind::Image => vec![
            format!("Processing image \"{}\"...", file_name),
            "Analyzing image content...".to_string(),
            "Extracting visual information...".to_string(),
            "Finalizing upload...".to_string(),
        ],
    }
}
