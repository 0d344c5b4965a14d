//! Long-lived conversation session.
//!
//! Owns the transcript, the mode selectors, the input control and the
//! session list. Chat sends and attachment uploads use two independent
//! pending slots, so an upload never blocks a send and vice versa.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kiki_client::{Backend, ClientError};
use kiki_core::config::{ChatConfig, KikiConfig};
use kiki_core::error::ValidationError;
use kiki_core::events::{DomainEvent, EventBus};
use kiki_core::notice::show_notice;
use kiki_core::status::with_rotating_status;
use kiki_core::types::{
    summary_title, Activity, Attachment, AttachmentKind, ChatMode, ConversationSummary, Message,
    RequestOutcome, Timestamp, UploadFile,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::status::{thinking_messages, upload_messages};

/// Bot reply when the chat endpoint could not be reached.
pub const CONNECTION_ERROR_TEXT: &str =
    "Sorry, I'm having trouble connecting to the server. Please make sure the backend is running.";

/// Question put to the user before everything is cleared.
pub const CLEAR_ALL_PROMPT: &str = "Are you sure you want to clear all conversations?";

/// The two mode selectors: the prominent one shown before the first message
/// and the compact one shown during a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    Welcome,
    Compact,
}

/// A finished send: the bot reply and how the request ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub outcome: RequestOutcome,
    pub reply: Message,
}

#[derive(Debug)]
struct SessionState {
    mode: ChatMode,
    history: Vec<Message>,
    /// Most recent first.
    conversations: Vec<ConversationSummary>,
    input: String,
    input_enabled: bool,
    chat_pending: bool,
    upload_pending: bool,
    /// Bumped whenever the transcript is wiped; replies to older requests are dropped.
    generation: u64,
}

/// Re-enables input when a send finishes, however it finishes.
struct SendSlot<'a> {
    session: &'a ConversationSession,
}

impl Drop for SendSlot<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.session.lock();
            state.chat_pending = false;
            state.input_enabled = true;
        }
        self.session.publish(DomainEvent::InputEnabledChanged {
            enabled: true,
            timestamp: Timestamp::now(),
        });
    }
}

struct UploadSlot<'a> {
    session: &'a ConversationSession,
}

impl Drop for UploadSlot<'_> {
    fn drop(&mut self) {
        self.session.lock().upload_pending = false;
    }
}

pub struct ConversationSession {
    backend: Arc<dyn Backend>,
    events: EventBus,
    config: ChatConfig,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl ConversationSession {
    pub fn new(backend: Arc<dyn Backend>, events: EventBus, config: &KikiConfig) -> Self {
        Self {
            backend,
            events,
            config: config.chat.clone(),
            state: Mutex::new(SessionState {
                mode: config.chat.start_mode,
                history: Vec::new(),
                conversations: Vec::new(),
                input: String::new(),
                input_enabled: true,
                chat_pending: false,
                upload_pending: false,
                generation: 0,
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn mode(&self) -> ChatMode {
        self.lock().mode
    }

    /// Value shown by `selector`. Both selectors always agree.
    pub fn selector_value(&self, _selector: Selector) -> ChatMode {
        self.mode()
    }

    /// The compact selector is shown once the conversation has messages.
    pub fn compact_selector_visible(&self) -> bool {
        !self.lock().history.is_empty()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().history.clone()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.lock().conversations.clone()
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    pub fn is_input_enabled(&self) -> bool {
        self.lock().input_enabled
    }

    pub fn is_sending(&self) -> bool {
        self.lock().chat_pending
    }

    pub fn is_uploading(&self) -> bool {
        self.lock().upload_pending
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Input and mode
    // =========================================================================

    /// Replace the input draft (typing, or recognised speech).
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.lock().input = text.clone();
        self.publish(DomainEvent::InputDraftChanged {
            text,
            timestamp: Timestamp::now(),
        });
    }

    /// Send whatever is in the input draft.
    pub async fn submit_input(&self) -> Result<Option<Exchange>, ChatError> {
        let draft = self.input();
        self.send(&draft).await
    }

    /// Change the mode from either selector.
    ///
    /// Both selectors follow and a "Switched to ..." notice is shown.
    /// Selecting the mode already in effect does nothing.
    pub fn set_mode(&self, selector: Selector, mode: ChatMode) -> bool {
        {
            let mut state = self.lock();
            if state.mode == mode {
                return false;
            }
            state.mode = mode;
        }
        info!(?selector, %mode, "Mode switched");
        self.publish(DomainEvent::ModeChanged {
            mode,
            timestamp: Timestamp::now(),
        });
        show_notice(
            &self.events,
            format!("Switched to {}", mode.bot_label()),
            Duration::from_millis(self.config.notice_dismiss_ms),
        );
        true
    }

    // =========================================================================
    // Send
    // =========================================================================

    /// Send one message.
    ///
    /// Blank text is ignored and returns `Ok(None)`. Otherwise the user
    /// message is appended at once, input is disabled until the reply
    /// arrives, and the reply (answer, reported error or connectivity notice)
    /// is appended as a bot message.
    pub async fn send(&self, text: &str) -> Result<Option<Exchange>, ChatError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(None);
        }

        let user = Message::user(text.clone());
        let (mode, generation, first_message) = {
            let mut state = self.lock();
            if state.chat_pending {
                return Err(ChatError::SendPending);
            }
            state.chat_pending = true;
            state.input_enabled = false;
            state.input.clear();
            let first_message = state.history.is_empty();
            state.history.push(user.clone());
            (state.mode, state.generation, first_message)
        };
        let slot = SendSlot { session: self };

        let timestamp = Timestamp::now();
        self.publish(DomainEvent::InputEnabledChanged {
            enabled: false,
            timestamp,
        });
        self.publish(DomainEvent::InputDraftChanged {
            text: String::new(),
            timestamp,
        });
        self.publish(DomainEvent::MessageAppended {
            message: user,
            timestamp,
        });
        if first_message {
            self.publish(DomainEvent::CompactSelectorVisibility {
                visible: true,
                timestamp,
            });
        }
        self.publish(DomainEvent::RequestStarted {
            activity: Activity::Chat,
            timestamp,
        });

        let reply = with_rotating_status(
            self.backend.chat(&text, mode),
            &thinking_messages(mode),
            Duration::from_millis(self.config.thinking_interval_ms),
            |status| self.publish_status(Activity::Chat, status),
        )
        .await;

        let (reply_text, outcome) = match reply {
            Ok(answer) => (answer, RequestOutcome::Success),
            Err(ClientError::Reported(err)) => {
                info!(%err, "Chat error reported by backend");
                (format!("Error: {}", err), RequestOutcome::ReportedError)
            }
            Err(ClientError::Transport(err)) => {
                error!(%err, "Chat request failed");
                (
                    CONNECTION_ERROR_TEXT.to_string(),
                    RequestOutcome::TransportError,
                )
            }
        };

        let (reply, registered) = {
            let mut state = self.lock();
            let reply = Message::bot(reply_text, state.mode);
            if state.generation != generation {
                debug!("Dropping reply to a message sent before the session was cleared");
                (reply, None)
            } else {
                state.history.push(reply.clone());
                let registered = (outcome == RequestOutcome::Success
                    && state.history.len() <= 2)
                    .then(|| self.register_conversation(&mut state, &text));
                self.publish(DomainEvent::MessageAppended {
                    message: reply.clone(),
                    timestamp: Timestamp::now(),
                });
                (reply, registered)
            }
        };

        if let Some(summary) = registered {
            self.publish(DomainEvent::ConversationRegistered {
                summary,
                timestamp: Timestamp::now(),
            });
        }
        self.publish(DomainEvent::RequestFinished {
            activity: Activity::Chat,
            outcome,
            timestamp: Timestamp::now(),
        });
        drop(slot);

        Ok(Some(Exchange { outcome, reply }))
    }

    fn register_conversation(&self, state: &mut SessionState, text: &str) -> ConversationSummary {
        for conversation in state.conversations.iter_mut() {
            conversation.active = false;
        }
        let summary = ConversationSummary {
            id: Uuid::new_v4(),
            title: summary_title(text, self.config.summary_title_chars),
            active: true,
        };
        state.conversations.insert(0, summary.clone());
        summary
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Start a fresh conversation.
    ///
    /// Messages are cleared, the mode goes back to RAG whatever mode the
    /// session started in, the active conversation marker is removed and the
    /// server is asked to forget the conversation. A failure of that last
    /// step is only logged.
    pub async fn new_session(&self) {
        let mode = {
            let mut state = self.lock();
            state.history.clear();
            state.generation += 1;
            state.mode = ChatMode::default();
            for conversation in state.conversations.iter_mut() {
                conversation.active = false;
            }
            state.mode
        };
        info!("New chat session");

        let timestamp = Timestamp::now();
        self.publish(DomainEvent::MessagesCleared { timestamp });
        self.publish(DomainEvent::CompactSelectorVisibility {
            visible: false,
            timestamp,
        });
        self.publish(DomainEvent::ModeChanged { mode, timestamp });
        self.publish(DomainEvent::ConversationDeactivated { timestamp });

        self.clear_server_memory().await;
    }

    /// Wipe the session list and the transcript after `confirm` agrees.
    ///
    /// `confirm` receives [`CLEAR_ALL_PROMPT`]. Returns whether anything was cleared.
    pub async fn clear_all<F>(&self, confirm: F) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        if !confirm(CLEAR_ALL_PROMPT) {
            debug!("Clear all declined");
            return false;
        }

        {
            let mut state = self.lock();
            state.history.clear();
            state.conversations.clear();
            state.generation += 1;
        }
        info!("All conversations cleared");

        let timestamp = Timestamp::now();
        self.publish(DomainEvent::ConversationsCleared { timestamp });
        self.publish(DomainEvent::MessagesCleared { timestamp });
        self.publish(DomainEvent::CompactSelectorVisibility {
            visible: false,
            timestamp,
        });

        self.clear_server_memory().await;
        true
    }

    async fn clear_server_memory(&self) {
        if let Err(e) = self.backend.clear(None).await {
            warn!(error = %e, "Failed to clear server conversation memory");
        }
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Upload a document or image into the knowledge base.
    ///
    /// The file is checked before anything is sent. The outcome is appended
    /// as a bot message and also returned.
    pub async fn attach(
        &self,
        kind: AttachmentKind,
        file: Option<UploadFile>,
    ) -> Result<Message, ChatError> {
        let attachment = Attachment::validate(kind, file).map_err(|e| self.reject(e))?;

        let generation = {
            let mut state = self.lock();
            if state.upload_pending {
                return Err(ChatError::UploadPending);
            }
            state.upload_pending = true;
            state.generation
        };
        let slot = UploadSlot { session: self };

        let activity = Activity::Upload { kind };
        let name = attachment.file.name.clone();
        info!(%kind, file = %name, "Uploading attachment");
        self.publish(DomainEvent::RequestStarted {
            activity,
            timestamp: Timestamp::now(),
        });

        let interval_ms = match kind {
            AttachmentKind::Document => self.config.document_upload_interval_ms,
            AttachmentKind::Image => self.config.image_upload_interval_ms,
        };
        let result = with_rotating_status(
            self.backend.upload(kind, &attachment.file),
            &upload_messages(kind, &name),
            Duration::from_millis(interval_ms),
            |status| self.publish_status(activity, status),
        )
        .await;

        let (text, outcome) = match result {
            Ok(message) => (
                message.unwrap_or_else(|| default_upload_message(kind).to_string()),
                RequestOutcome::Success,
            ),
            Err(ClientError::Reported(err)) => {
                (format!("Error: {}", err), RequestOutcome::ReportedError)
            }
            Err(ClientError::Transport(err)) => {
                error!(%kind, %err, "Upload failed");
                (
                    upload_failure_text(kind).to_string(),
                    RequestOutcome::TransportError,
                )
            }
        };

        let reply = {
            let mut state = self.lock();
            let reply = Message::bot(text, state.mode);
            if state.generation == generation {
                let first_message = state.history.is_empty();
                state.history.push(reply.clone());
                drop(state);
                let timestamp = Timestamp::now();
                self.publish(DomainEvent::MessageAppended {
                    message: reply.clone(),
                    timestamp,
                });
                if first_message {
                    self.publish(DomainEvent::CompactSelectorVisibility {
                        visible: true,
                        timestamp,
                    });
                }
            } else {
                debug!("Dropping upload reply for a cleared session");
            }
            reply
        };

        self.publish(DomainEvent::RequestFinished {
            activity,
            outcome,
            timestamp: Timestamp::now(),
        });
        drop(slot);
        Ok(reply)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject(&self, err: ValidationError) -> ChatError {
        debug!(reason = %err, "Attachment rejected");
        self.publish(DomainEvent::ValidationFailed {
            scope: "attachment".to_string(),
            message: err.to_string(),
            timestamp: Timestamp::now(),
        });
        ChatError::Validation(err)
    }

    fn publish_status(&self, activity: Activity, text: &str) {
        self.publish(DomainEvent::StatusText {
            activity,
            text: text.to_string(),
            timestamp: Timestamp::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        self.events.publish(event);
    }
}

fn default_upload_message(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Document => "Document uploaded and processed successfully!",
        AttachmentKind::Image => "Image uploaded successfully!",
    }
}

fn upload_failure_text(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Document => "Sorry, there was an error uploading the file.",
        AttachmentKind::Image => "Sorry, there was an error uploading the image.",
    }
}

// =============================================================================
// Tests
// =============================================================================
