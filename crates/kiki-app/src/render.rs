//! Terminal rendering of domain events.
//!
//! The only place that turns state changes into output. Everything else in
//! the workspace publishes events and never prints.

use tokio::sync::broadcast;
use tracing::warn;

use kiki_core::events::DomainEvent;
use kiki_core::markup::{render_answer, SanitizePolicy};
use kiki_core::types::{FlowKind, StageMarker, WizardStage};

const BOLD_ON: &str = "\x1b[1m";
const BOLD_OFF: &str = "\x1b[22m";
const ITALIC_ON: &str = "\x1b[3m";
const ITALIC_OFF: &str = "\x1b[23m";
const DIM_ON: &str = "\x1b[2m";

/// Turn a rendered answer fragment into ANSI-styled terminal text.
pub fn html_to_terminal(html: &str) -> String {
    html.replace("<strong>", BOLD_ON)
        .replace("</strong>", BOLD_OFF)
        .replace("<em>", ITALIC_ON)
        .replace("</em>", ITALIC_OFF)
        .replace("<br>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn stage_title(flow: FlowKind, stage: WizardStage) -> &'static str {
    match (flow, stage) {
        (_, WizardStage::AwaitingQuery) => "Enter your question",
        (FlowKind::FileRag, WizardStage::AwaitingSource) => "Choose a document",
        (FlowKind::UrlRag, WizardStage::AwaitingSource) => "Enter a web page URL",
        (_, WizardStage::ShowingResult) => "Answer",
    }
}

fn progress_bar(progress: &[StageMarker; 3]) -> String {
    progress
        .iter()
        .map(|marker| match marker {
            StageMarker::Completed => "[x]",
            StageMarker::Active => "[>]",
            StageMarker::Inactive => "[ ]",
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The line(s) to print for an event, if any.
pub fn describe(event: &DomainEvent, policy: SanitizePolicy) -> Option<String> {
    match event {
        DomainEvent::WizardStageChanged {
            flow, to, progress, ..
        } => Some(format!(
            "{} Step {}/3: {}",
            progress_bar(progress),
            to.index() + 1,
            stage_title(*flow, *to)
        )),
        DomainEvent::WizardSourceSelected { description, .. } => {
            Some(format!("Selected: {description}"))
        }
        DomainEvent::WizardSourceRemoved { .. } => Some("Source removed".to_string()),
        DomainEvent::WizardAnswerRendered { question, html, .. } => Some(format!(
            "{BOLD_ON}Q:{BOLD_OFF} {question}\n{}",
            html_to_terminal(html)
        )),
        DomainEvent::WizardFailed { message, .. } => Some(message.clone()),
        DomainEvent::ValidationFailed { message, .. } => Some(format!("! {message}")),
        DomainEvent::StatusText { text, .. } => Some(format!("{DIM_ON}{text}\x1b[0m")),
        DomainEvent::NoticeShown { text, .. } => Some(format!("* {text}")),
        DomainEvent::MessageAppended { message, .. } if !message.is_user() => Some(format!(
            "{BOLD_ON}{}:{BOLD_OFF} {}",
            message.label,
            html_to_terminal(&render_answer(&message.text, policy))
        )),
        DomainEvent::ConversationRegistered { summary, .. } => {
            Some(format!("{DIM_ON}Saved conversation: {}\x1b[0m", summary.title))
        }
        DomainEvent::ConversationsCleared { .. } => {
            Some("All conversations cleared.".to_string())
        }
        DomainEvent::ListeningChanged { listening, .. } => Some(if *listening {
            "(listening...)".to_string()
        } else {
            "(stopped listening)".to_string()
        }),
        DomainEvent::TranscriptUpdated { text, .. } => Some(format!("(heard) {text}")),
        DomainEvent::VoiceSelected { name, .. } => Some(format!(
            "{DIM_ON}Voice: {}\x1b[0m",
            name.as_deref().unwrap_or("system default")
        )),
        _ => None,
    }
}

/// Print events until every publisher is gone.
pub async fn run(mut rx: broadcast::Receiver<DomainEvent>, policy: SanitizePolicy) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(text) = describe(&event, policy) {
                    println!("{text}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Renderer fell behind; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
