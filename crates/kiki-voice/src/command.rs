//! Speech output through a local text-to-speech program.
//!
//! Supports macOS `say` and `espeak`/`espeak-ng`. Each utterance runs as a
//! child process; cancelling kills it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::VoiceError;
use crate::platform::{PlatformSignal, SpeechSynthesizer, Utterance, VoiceInfo};

/// Words per minute both programs use at rate 1.0.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

const PROBE_ORDER: &[&str] = &["say", "espeak-ng", "espeak"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlavor {
    Say,
    Espeak,
}

impl CommandFlavor {
    fn from_program(program: &Path) -> Option<Self> {
        match program.file_stem()?.to_str()? {
            "say" => Some(Self::Say),
            "espeak" | "espeak-ng" => Some(Self::Espeak),
            _ => None,
        }
    }

    /// Arguments for one utterance, text last.
    pub fn args(self, utterance: &Utterance) -> Vec<String> {
        let wpm = (BASE_WORDS_PER_MINUTE * utterance.rate).round() as u32;
        let mut args = Vec::new();
        if let Some(voice) = &utterance.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        match self {
            Self::Say => {
                args.push("-r".to_string());
                args.push(wpm.to_string());
            }
            Self::Espeak => {
                let pitch = (50.0 * utterance.pitch).clamp(0.0, 99.0).round() as u32;
                let amplitude = (100.0 * utterance.volume).clamp(0.0, 200.0).round() as u32;
                args.extend([
                    "-s".to_string(),
                    wpm.to_string(),
                    "-p".to_string(),
                    pitch.to_string(),
                    "-a".to_string(),
                    amplitude.to_string(),
                ]);
            }
        }
        args.push("--".to_string());
        args.push(utterance.text.clone());
        args
    }

    fn list_voices_args(self) -> &'static [&'static str] {
        match self {
            Self::Say => &["-v", "?"],
            Self::Espeak => &["--voices"],
        }
    }

    pub fn parse_voices(self, listing: &str) -> Vec<VoiceInfo> {
        match self {
            Self::Say => parse_say_voices(listing),
            Self::Espeak => parse_espeak_voices(listing),
        }
    }
}

/// `say -v ?` lines look like `Alex    en_US    # Most people recognize me by my voice.`
fn parse_say_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, lang) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || lang.is_empty() {
                return None;
            }
            Some(VoiceInfo::new(name, lang.replace('_', "-")))
        })
        .collect()
}

/// `espeak --voices` prints a header, then `Pty Language Age/Gender VoiceName File ...`.
fn parse_espeak_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_, lang, _, name, ..] => Some(VoiceInfo::new(*name, *lang)),
                _ => None,
            }
        })
        .collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Find `program` on `PATH`, or accept it as given if it is a path.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

pub struct CommandSynthesizer {
    program: PathBuf,
    flavor: CommandFlavor,
    voices: Vec<VoiceInfo>,
    signals: mpsc::UnboundedSender<PlatformSignal>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CommandSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSynthesizer")
            .field("program", &self.program)
            .field("flavor", &self.flavor)
            .field("voices", &self.voices.len())
            .finish()
    }
}

impl CommandSynthesizer {
    /// Locate a speech program and load its voices.
    ///
    /// `configured` wins when non-empty; otherwise `say`, `espeak-ng` and
    /// `espeak` are tried in turn. Returns `None` when nothing usable exists.
    pub async fn detect(
        configured: &str,
        signals: mpsc::UnboundedSender<PlatformSignal>,
    ) -> Option<Self> {
        let candidates: Vec<&str> = if configured.trim().is_empty() {
            PROBE_ORDER.to_vec()
        } else {
            vec![configured.trim()]
        };

        for name in candidates {
            let Some(program) = resolve_program(name) else {
                continue;
            };
            let Some(flavor) = CommandFlavor::from_program(&program) else {
                warn!(program = %program.display(), "Unrecognised speech program");
                continue;
            };
            let voices = match list_voices(&program, flavor).await {
                Ok(voices) => voices,
                Err(e) => {
                    warn!(program = %program.display(), error = %e, "Could not list voices");
                    Vec::new()
                }
            };
            info!(program = %program.display(), voices = voices.len(), "Speech output available");
            return Some(Self {
                program,
                flavor,
                voices,
                signals,
                current: Mutex::new(None),
            });
        }
        debug!("No speech output program found");
        None
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

async fn list_voices(program: &Path, flavor: CommandFlavor) -> Result<Vec<VoiceInfo>, VoiceError> {
    let output = Command::new(program)
        .args(flavor.list_voices_args())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(VoiceError::Platform(format!(
            "voice listing exited with {}",
            output.status
        )));
    }
    Ok(flavor.parse_voices(&String::from_utf8_lossy(&output.stdout)))
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) -> Result<(), VoiceError> {
        let mut child = Command::new(&self.program)
            .args(self.flavor.args(&utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let id = utterance.id;
        let signals = self.signals.clone();
        let _ = signals.send(PlatformSignal::UtteranceStarted(id));
        let handle = tokio::spawn(async move {
            let signal = match child.wait().await {
                Ok(status) if status.success() => PlatformSignal::UtteranceEnded(id),
                Ok(status) => PlatformSignal::UtteranceError {
                    id,
                    reason: format!("speech program exited with {status}"),
                },
                Err(e) => PlatformSignal::UtteranceError {
                    id,
                    reason: e.to_string(),
                },
            };
            let _ = signals.send(signal);
        });

        if let Some(previous) = lock(&self.current).replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel(&self) {
        // Aborting drops the child, which kills it.
        if let Some(handle) = lock(&self.current).take() {
            handle.abort();
        }
    }
}
