//! Kiki client binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialise logging
//! 3. Build the HTTP backend, the event bus and the terminal renderer
//! 4. Run the requested command: the interactive conversation, a one-shot
//!    document or web page question, a health check, or writing the default
//!    configuration file

mod cli;
mod render;
mod repl;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use kiki_chat::ConversationSession;
use kiki_client::{Backend, HttpBackend};
use kiki_core::config::KikiConfig;
use kiki_core::events::EventBus;
use kiki_core::types::UploadFile;
use kiki_voice::{CommandSynthesizer, SpeechSynthesizer, VoiceEngine};
use kiki_wizard::{FileRagFlow, FileSource, UrlRagFlow, UrlSource, WizardResult};

use cli::{CliArgs, Command};
use repl::Repl;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> AppResult<ExitCode> {
    let args = CliArgs::parse();

    let command = args.command();
    let config_path = args.resolve_config_path();
    let config_exists = config_path.exists();
    // init-config never reads the existing file.
    let mut config = if config_exists && !matches!(command, Command::InitConfig { .. }) {
        KikiConfig::load(&config_path)?
    } else {
        KikiConfig::default()
    };
    config.backend.base_url = args.resolve_base_url(&config.backend.base_url);
    config.chat.start_mode = args.resolve_mode(config.chat.start_mode);

    kiki_core::logging::init(&args.resolve_log_level(&config.general.log_level));
    if !config_exists {
        tracing::info!(path = %config_path.display(), "No config file; using defaults");
    }
    tracing::info!(base_url = %config.backend.base_url, "Kiki starting");

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::from_config(&config.backend)?);

    match command {
        Command::Health => health(backend.as_ref()).await,
        Command::AskFile { question, file } => ask_file(backend, &config, &question, &file).await,
        Command::AskUrl { question, url } => ask_url(backend, &config, &question, &url).await,
        Command::Chat => chat(backend, &config).await,
        Command::InitConfig { force } => {
            if init_config(&config_path, &config, force)? {
                println!("Wrote {}", config_path.display());
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!(
                    "{} already exists; pass --force to overwrite it",
                    config_path.display()
                );
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Write `config` to `path`. Returns `false` when the file exists and
/// `force` is not set.
fn init_config(path: &Path, config: &KikiConfig, force: bool) -> kiki_core::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    config.save(path)?;
    Ok(true)
}

async fn health(backend: &dyn Backend) -> AppResult<ExitCode> {
    let status = backend.health().await?;
    println!(
        "status: {}\nmodel: {}\ndatabase: {}",
        status.status, status.model, status.database
    );
    Ok(if status.is_ready() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn spawn_renderer(events: &EventBus, config: &KikiConfig) -> JoinHandle<()> {
    tokio::spawn(render::run(events.subscribe(), config.render.sanitize))
}

/// Let the renderer print what is still queued once every publisher is gone.
async fn drain_renderer(renderer: JoinHandle<()>) {
    if tokio::time::timeout(Duration::from_secs(1), renderer).await.is_err() {
        tracing::debug!("Renderer still busy at exit");
    }
}

fn exit_code(result: &WizardResult) -> ExitCode {
    if result.is_answer() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn ask_file(
    backend: Arc<dyn Backend>,
    config: &KikiConfig,
    question: &str,
    path: &Path,
) -> AppResult<ExitCode> {
    let events = EventBus::default();
    let renderer = spawn_renderer(&events, config);
    let flow = FileRagFlow::new(FileSource, backend, events, config);

    let outcome = async {
        flow.advance(question)?;
        let file = UploadFile::from_path(path).await?;
        flow.submit_source(file).await
    }
    .await;

    drop(flow);
    drain_renderer(renderer).await;
    Ok(exit_code(&outcome?))
}

async fn ask_url(
    backend: Arc<dyn Backend>,
    config: &KikiConfig,
    question: &str,
    url: &str,
) -> AppResult<ExitCode> {
    let events = EventBus::default();
    let renderer = spawn_renderer(&events, config);
    let flow = UrlRagFlow::new(UrlSource, backend, events, config);

    let outcome = async {
        flow.advance(question)?;
        flow.submit_source(url.to_string()).await
    }
    .await;

    drop(flow);
    drain_renderer(renderer).await;
    Ok(exit_code(&outcome?))
}

async fn chat(backend: Arc<dyn Backend>, config: &KikiConfig) -> AppResult<ExitCode> {
    let events = EventBus::default();
    let renderer = spawn_renderer(&events, config);

    let session = Arc::new(ConversationSession::new(backend, events.clone(), config));

    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let synthesizer = CommandSynthesizer::detect(&config.voice.synthesizer_command, signal_tx)
        .await
        .map(|s| Arc::new(s) as Arc<dyn SpeechSynthesizer>);
    // No terminal speech recognizer exists yet, so voice input reports as unsupported.
    let voice = Arc::new(VoiceEngine::new(
        None,
        synthesizer,
        events.clone(),
        &config.voice,
    ));
    tokio::spawn(voice.clone().run_platform_signals(signal_rx));
    tokio::spawn(repl::run_voice_bridge(
        events.subscribe(),
        session.clone(),
        voice.clone(),
    ));
    voice.compatibility_notice();
    voice.select_default_voice();

    Repl::new(session, voice).run().await?;

    drop(events);
    renderer.abort();
    tracing::info!("Kiki stopped");
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// Tests
// =============================================================================
