//! Interactive conversation loop.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use kiki_chat::{ChatError, ConversationSession, Selector, CLEAR_ALL_PROMPT};
use kiki_core::error::KikiError;
use kiki_core::events::DomainEvent;
use kiki_core::types::{AttachmentKind, ChatMode, Message, MessageId, UploadFile};
use kiki_voice::{VoiceEngine, VoiceError};

pub const HELP: &str = "\
Commands:
  /mode <chat|rag>            switch conversation mode
  /new                        start a new conversation
  /clear                      clear all conversations
  /attach <doc|image> <path>  upload a file to the knowledge base
  /history                    list this session's conversations
  /listen                     start or stop voice input
  /voices                     list output voices
  /voice <name>               choose an output voice
  /speak [n]                  read the latest reply (or reply n) aloud; again to stop
  /autospeak                  toggle speaking every reply aloud
  /stop                       stop speaking
  /help                       show this help
  /quit                       leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    Mode(ChatMode),
    New,
    Clear,
    Attach { kind: AttachmentKind, path: PathBuf },
    History,
    Listen,
    Voices,
    Voice(String),
    /// Replay a bot reply, counted from 1. `None` is the latest.
    Speak(Option<usize>),
    AutoSpeak,
    Stop,
    Help,
    Quit,
    /// A slash command that could not be understood, with a hint.
    Invalid(String),
}

impl ReplCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name, arg) {
            ("mode", arg) => match arg.parse::<ChatMode>() {
                Ok(mode) => Self::Mode(mode),
                Err(_) => Self::Invalid("Usage: /mode <chat|rag>".into()),
            },
            ("new", "") => Self::New,
            ("clear", "") => Self::Clear,
            ("attach", arg) => parse_attach(arg),
            ("history", "") => Self::History,
            ("listen", "") => Self::Listen,
            ("voices", "") => Self::Voices,
            ("voice", "") => Self::Invalid("Usage: /voice <name>".into()),
            ("voice", name) => Self::Voice(name.to_string()),
            ("speak", "") => Self::Speak(None),
            ("speak", arg) => match arg.parse::<usize>() {
                Ok(n) if n > 0 => Self::Speak(Some(n)),
                _ => Self::Invalid("Usage: /speak [n]".into()),
            },
            ("autospeak", "") => Self::AutoSpeak,
            ("stop", "") => Self::Stop,
            ("help", "") => Self::Help,
            ("quit" | "exit", "") => Self::Quit,
            _ => Self::Invalid(format!("Unknown command: /{name}. Type /help for a list.")),
        };
        Some(command)
    }
}

fn parse_attach(arg: &str) -> ReplCommand {
    let usage = || ReplCommand::Invalid("Usage: /attach <doc|image> <path>".into());
    let Some((kind, path)) = arg.split_once(char::is_whitespace) else {
        return usage();
    };
    let kind = match kind {
        "doc" | "document" => AttachmentKind::Document,
        "image" | "img" => AttachmentKind::Image,
        _ => return usage(),
    };
    let path = path.trim();
    if path.is_empty() {
        return usage();
    }
    ReplCommand::Attach {
        kind,
        path: PathBuf::from(path),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Feed recognised speech into the input draft and speak bot replies.
pub async fn run_voice_bridge(
    mut rx: broadcast::Receiver<DomainEvent>,
    session: Arc<ConversationSession>,
    voice: Arc<VoiceEngine>,
) {
    loop {
        match rx.recv().await {
            Ok(DomainEvent::TranscriptUpdated { text, .. }) => session.set_input(text),
            Ok(DomainEvent::MessageAppended { message, .. })
                if !message.is_user() && voice.auto_speak() =>
            {
                voice.stop_listening();
                if let Err(e) = voice.speak(&message.text) {
                    debug!(error = %e, "Reply not spoken");
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Voice bridge fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Result of a `/speak` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Started(MessageId),
    Stopped,
    /// The reply had nothing left to say once formatting was removed.
    Silent,
    NoSuchMessage,
}

/// Per-reply speech playback. Asking again for the reply still playing stops it.
#[derive(Debug, Default)]
pub struct Playback {
    playing: Option<(MessageId, Uuid)>,
}

impl Playback {
    pub fn toggle(
        &mut self,
        voice: &VoiceEngine,
        messages: &[Message],
        index: Option<usize>,
    ) -> Result<SpeakOutcome, VoiceError> {
        let mut replies = messages.iter().filter(|m| !m.is_user());
        let target = match index {
            Some(n) => n.checked_sub(1).and_then(|i| replies.nth(i)),
            None => replies.last(),
        };
        let Some(message) = target else {
            return Ok(SpeakOutcome::NoSuchMessage);
        };

        if let Some((id, utterance)) = self.playing.take() {
            if id == message.id && voice.current_utterance() == Some(utterance) {
                voice.stop_speaking();
                return Ok(SpeakOutcome::Stopped);
            }
        }

        voice.stop_listening();
        match voice.speak(&message.text)? {
            Some(utterance) => {
                self.playing = Some((message.id, utterance));
                Ok(SpeakOutcome::Started(message.id))
            }
            None => Ok(SpeakOutcome::Silent),
        }
    }
}

/// Runs parsed commands against the session and the voice engine.
///
/// Sends and uploads run as tasks, so the prompt keeps taking commands while
/// the backend works.
pub struct CommandRunner {
    session: Arc<ConversationSession>,
    voice: Arc<VoiceEngine>,
    playback: Playback,
}

impl CommandRunner {
    pub fn new(session: Arc<ConversationSession>, voice: Arc<VoiceEngine>) -> Self {
        Self {
            session,
            voice,
            playback: Playback::default(),
        }
    }

    /// Run one command. Returns the task of a send or upload still in flight.
    ///
    /// `/clear` and `/quit` need the terminal and are handled by [`Repl`].
    pub async fn execute(&mut self, command: ReplCommand) -> Option<JoinHandle<()>> {
        match command {
            ReplCommand::Send(text) => {
                self.voice.stop_listening();
                let session = self.session.clone();
                return Some(tokio::spawn(async move {
                    report(session.send(&text).await.map(|_| ()));
                }));
            }
            ReplCommand::Mode(mode) => {
                if !self.session.set_mode(Selector::Compact, mode) {
                    println!("Already in {mode} mode.");
                }
            }
            ReplCommand::New => {
                self.voice.stop_speaking();
                self.session.new_session().await;
                println!("Started a new conversation.");
            }
            ReplCommand::Attach { kind, path } => {
                let file = match UploadFile::from_path(&path).await {
                    Ok(file) => file,
                    Err(e) => {
                        println!("! Could not read {}: {e}", path.display());
                        return None;
                    }
                };
                let session = self.session.clone();
                return Some(tokio::spawn(async move {
                    report(session.attach(kind, Some(file)).await.map(|_| ()));
                }));
            }
            ReplCommand::History => {
                let conversations = self.session.conversations();
                if conversations.is_empty() {
                    println!("No conversations yet.");
                }
                for summary in conversations {
                    let marker = if summary.active { ">" } else { " " };
                    println!("{marker} {}", summary.title);
                }
            }
            ReplCommand::Listen => {
                if !self.voice.is_listening() {
                    self.voice.stop_speaking();
                }
                if let Err(e) = self.voice.toggle_listening() {
                    println!("! {e}");
                }
            }
            ReplCommand::Voices => {
                let groups = self.voice.available_voices();
                if groups.is_empty() {
                    println!("No output voices available.");
                }
                let selected = self.voice.selected_voice();
                for voice in groups.iter() {
                    let marker = if selected.as_deref() == Some(voice.name.as_str()) {
                        ">"
                    } else {
                        " "
                    };
                    println!("{marker} {} ({})", voice.name, voice.lang);
                }
            }
            ReplCommand::Voice(name) => {
                if !self.voice.set_voice(&name) {
                    println!("! No voice named {name}");
                }
            }
            ReplCommand::Speak(index) => {
                let messages = self.session.messages();
                match self.playback.toggle(&self.voice, &messages, index) {
                    Ok(SpeakOutcome::NoSuchMessage) => println!("! No such reply"),
                    Ok(_) => {}
                    Err(e) => println!("! {e}"),
                }
            }
            ReplCommand::AutoSpeak => {
                let on = self.voice.toggle_auto_speak();
                if !on {
                    self.voice.stop_speaking();
                }
                println!("Auto-speak {}", if on { "on" } else { "off" });
            }
            ReplCommand::Stop => self.voice.stop_speaking(),
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Invalid(hint) => println!("! {hint}"),
            ReplCommand::Clear | ReplCommand::Quit => {}
        }
        None
    }

    /// Clear every conversation once the user has answered the prompt.
    pub async fn clear_all(&self, confirmed: bool) {
        self.session.clear_all(|_| confirmed).await;
    }

    fn shutdown(&self) {
        self.voice.stop_listening();
        self.voice.stop_speaking();
    }
}

pub struct Repl {
    runner: CommandRunner,
    lines: Lines<BufReader<Stdin>>,
}

impl Repl {
    pub fn new(session: Arc<ConversationSession>, voice: Arc<VoiceEngine>) -> Self {
        Self {
            runner: CommandRunner::new(session, voice),
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub async fn run(mut self) -> Result<(), KikiError> {
        println!(
            "Kiki ({} mode). Type a message, or /help for commands.",
            self.runner.session.mode()
        );
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        while let Some(line) = self.lines.next_line().await? {
            let Some(command) = ReplCommand::parse(&line) else {
                continue;
            };
            match command {
                ReplCommand::Quit => break,
                ReplCommand::Clear => {
                    println!("{CLEAR_ALL_PROMPT} [y/N]");
                    let answer = self.lines.next_line().await?.unwrap_or_default();
                    self.runner.clear_all(is_yes(&answer)).await;
                }
                command => {
                    in_flight.retain(|task| !task.is_finished());
                    if let Some(task) = self.runner.execute(command).await {
                        in_flight.push(task);
                    }
                }
            }
        }
        for task in in_flight {
            task.abort();
        }
        self.runner.shutdown();
        Ok(())
    }
}

/// Validation failures are already shown through events.
fn report(result: Result<(), ChatError>) {
    match result {
        Ok(()) | Err(ChatError::Validation(_)) => {}
        Err(e) => println!("! {e}"),
    }
}
