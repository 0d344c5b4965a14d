use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    Activity, ChatMode, ConversationSummary, FlowKind, Message, RequestOutcome, StageMarker,
    Timestamp, WizardStage,
};

/// All state-transition events published by Kiki components.
///
/// State machines emit these after mutating their own state; the rendering
/// layer subscribes and updates presentation. Nothing in the state machines
/// renders anything itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Wizard Events
    // =========================================================================
    /// A wizard moved between stages.
    WizardStageChanged {
        flow: FlowKind,
        from: WizardStage,
        to: WizardStage,
        progress: [StageMarker; 3],
        timestamp: Timestamp,
    },

    /// A wizard accepted a source (file picked, URL entered).
    WizardSourceSelected {
        flow: FlowKind,
        description: String,
        timestamp: Timestamp,
    },

    /// A wizard's stored source was discarded.
    WizardSourceRemoved {
        flow: FlowKind,
        timestamp: Timestamp,
    },

    /// A wizard produced an answer, already converted to an HTML fragment.
    WizardAnswerRendered {
        flow: FlowKind,
        question: String,
        html: String,
        timestamp: Timestamp,
    },

    /// A wizard submission failed; `message` is shown in place of the answer.
    WizardFailed {
        flow: FlowKind,
        message: String,
        timestamp: Timestamp,
    },

    /// A wizard was reset to its first stage.
    WizardReset {
        flow: FlowKind,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Shared Events
    // =========================================================================
    /// User input was rejected locally. No request was made.
    ValidationFailed {
        scope: String,
        message: String,
        timestamp: Timestamp,
    },

    /// A request slot became busy.
    RequestStarted {
        activity: Activity,
        timestamp: Timestamp,
    },

    /// Rotating status text for a busy slot.
    StatusText {
        activity: Activity,
        text: String,
        timestamp: Timestamp,
    },

    /// A request slot became free again.
    RequestFinished {
        activity: Activity,
        outcome: RequestOutcome,
        timestamp: Timestamp,
    },

    /// A transient notice to show, dismissed after `dismiss_after_ms`.
    NoticeShown {
        id: Uuid,
        text: String,
        dismiss_after_ms: u64,
        timestamp: Timestamp,
    },

    /// A transient notice expired.
    NoticeDismissed {
        id: Uuid,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Conversation Events
    // =========================================================================
    /// A message was appended to the transcript.
    MessageAppended {
        message: Message,
        timestamp: Timestamp,
    },

    /// The transcript was emptied.
    MessagesCleared {
        timestamp: Timestamp,
    },

    /// The chat input was disabled or re-enabled.
    InputEnabledChanged {
        enabled: bool,
        timestamp: Timestamp,
    },

    /// The input draft was replaced (typing, recognised speech, send).
    InputDraftChanged {
        text: String,
        timestamp: Timestamp,
    },

    /// The conversation mode changed.
    ModeChanged {
        mode: ChatMode,
        timestamp: Timestamp,
    },

    /// The compact in-conversation mode selector was shown or hidden.
    CompactSelectorVisibility {
        visible: bool,
        timestamp: Timestamp,
    },

    /// A conversation was added to the session list after its first exchange.
    ConversationRegistered {
        summary: ConversationSummary,
        timestamp: Timestamp,
    },

    /// No conversation in the session list is marked active any more.
    ConversationDeactivated {
        timestamp: Timestamp,
    },

    /// The session list was emptied.
    ConversationsCleared {
        timestamp: Timestamp,
    },

    // =========================================================================
    // Voice Events
    // =========================================================================
    /// Recognition started or stopped.
    ListeningChanged {
        listening: bool,
        timestamp: Timestamp,
    },

    /// Running transcript since the current recognition session began.
    TranscriptUpdated {
        text: String,
        timestamp: Timestamp,
    },

    /// Speech output started or stopped.
    SpeakingChanged {
        speaking: bool,
        timestamp: Timestamp,
    },

    /// An utterance began playing.
    UtteranceStarted {
        utterance_id: Uuid,
        timestamp: Timestamp,
    },

    /// An utterance finished or was cut over by a newer one.
    UtteranceEnded {
        utterance_id: Uuid,
        timestamp: Timestamp,
    },

    /// An utterance failed. Also ends speaking.
    UtteranceFailed {
        utterance_id: Uuid,
        reason: String,
        timestamp: Timestamp,
    },

    /// The output voice changed. `None` means the platform default.
    VoiceSelected {
        name: Option<String>,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::WizardStageChanged { timestamp, .. }
            | DomainEvent::WizardSourceSelected { timestamp, .. }
            | DomainEvent::WizardSourceRemoved { timestamp, .. }
            | DomainEvent::WizardAnswerRendered { timestamp, .. }
            | DomainEvent::WizardFailed { timestamp, .. }
            | DomainEvent::WizardReset { timestamp, .. }
            | DomainEvent::ValidationFailed { timestamp, .. }
            | DomainEvent::RequestStarted { timestamp, .. }
            | DomainEvent::StatusText { timestamp, .. }
            | DomainEvent::RequestFinished { timestamp, .. }
            | DomainEvent::NoticeShown { timestamp, .. }
            | DomainEvent::NoticeDismissed { timestamp, .. }
            | DomainEvent::MessageAppended { timestamp, .. }
            | DomainEvent::MessagesCleared { timestamp }
            | DomainEvent::InputEnabledChanged { timestamp, .. }
            | DomainEvent::InputDraftChanged { timestamp, .. }
            | DomainEvent::ModeChanged { timestamp, .. }
            | DomainEvent::CompactSelectorVisibility { timestamp, .. }
            | DomainEvent::ConversationRegistered { timestamp, .. }
            | DomainEvent::ConversationDeactivated { timestamp }
            | DomainEvent::ConversationsCleared { timestamp }
            | DomainEvent::ListeningChanged { timestamp, .. }
            | DomainEvent::TranscriptUpdated { timestamp, .. }
            | DomainEvent::SpeakingChanged { timestamp, .. }
            | DomainEvent::UtteranceStarted { timestamp, .. }
            | DomainEvent::UtteranceEnded { timestamp, .. }
            | DomainEvent::UtteranceFailed { timestamp, .. }
            | DomainEvent::VoiceSelected { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::WizardStageChanged { .. } => "wizard_stage_changed",
            DomainEvent::WizardSourceSelected { .. } => "wizard_source_selected",
            DomainEvent::WizardSourceRemoved { .. } => "wizard_source_removed",
            DomainEvent::WizardAnswerRendered { .. } => "wizard_answer_rendered",
            DomainEvent::WizardFailed { .. } => "wizard_failed",
            DomainEvent::WizardReset { .. } => "wizard_reset",
            DomainEvent::ValidationFailed { .. } => "validation_failed",
            DomainEvent::RequestStarted { .. } => "request_started",
            DomainEvent::StatusText { .. } => "status_text",
            DomainEvent::RequestFinished { .. } => "request_finished",
            DomainEvent::NoticeShown { .. } => "notice_shown",
            DomainEvent::NoticeDismissed { .. } => "notice_dismissed",
            DomainEvent::MessageAppended { .. } => "message_appended",
            DomainEvent::MessagesCleared { .. } => "messages_cleared",
            DomainEvent::InputEnabledChanged { .. } => "input_enabled_changed",
            DomainEvent::InputDraftChanged { .. } => "input_draft_changed",
            DomainEvent::ModeChanged { .. } => "mode_changed",
            DomainEvent::CompactSelectorVisibility { .. } => "compact_selector_visibility",
            DomainEvent::ConversationRegistered { .. } => "conversation_registered",
            DomainEvent::ConversationDeactivated { .. } => "conversation_deactivated",
            DomainEvent::ConversationsCleared { .. } => "conversations_cleared",
            DomainEvent::ListeningChanged { .. } => "listening_changed",
            DomainEvent::TranscriptUpdated { .. } => "transcript_updated",
            DomainEvent::SpeakingChanged { .. } => "speaking_changed",
            DomainEvent::UtteranceStarted { .. } => "utterance_started",
            DomainEvent::UtteranceEnded { .. } => "utterance_ended",
            DomainEvent::UtteranceFailed { .. } => "utterance_failed",
            DomainEvent::VoiceSelected { .. } => "voice_selected",
        }
    }
}

/// Broadcast fan-out for domain events.
///
/// Cloning shares the underlying channel. Publishing with no subscribers is
/// not an error; events are simply dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: DomainEvent) {
        tracing::trace!(event = event.event_name(), "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}
