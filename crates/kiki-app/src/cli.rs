//! CLI argument definitions for the Kiki client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kiki_core::types::ChatMode;

/// Kiki - a terminal client for the Kiki assistant server.
#[derive(Parser, Debug)]
#[command(name = "kiki", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Backend base URL, including the `/api` prefix.
    #[arg(short = 'u', long = "base-url")]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Conversation mode to start in (chat, rag).
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<ChatMode>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive conversation (the default).
    Chat,
    /// Ask one question about a local document.
    AskFile {
        question: String,
        file: PathBuf,
    },
    /// Ask one question about a web page.
    AskUrl {
        question: String,
        url: String,
    },
    /// Check whether the backend is ready.
    Health,
    /// Write a configuration file with the default settings.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > KIKI_CONFIG env var > ~/.kiki/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|key| std::env::var(key).ok())
    }

    fn resolve_config_path_with(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env("KIKI_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the backend base URL.
    ///
    /// Priority: --base-url flag > KIKI_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config_url: &str) -> String {
        self.resolve_base_url_with(config_url, |key| std::env::var(key).ok())
    }

    fn resolve_base_url_with(
        &self,
        config_url: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        if let Some(url) = env("KIKI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            return url;
        }
        config_url.to_string()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the starting mode. Priority: --mode flag > config file value.
    pub fn resolve_mode(&self, config_mode: ChatMode) -> ChatMode {
        self.mode.unwrap_or(config_mode)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".kiki").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".kiki").join("config.toml");
    }
    PathBuf::from("config.toml")
}
