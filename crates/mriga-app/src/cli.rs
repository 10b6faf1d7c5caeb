//! CLI argument definitions for the Mriga client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Mriga: talk to Bihari personas by voice or text.
#[derive(Parser, Debug)]
#[command(name = "mriga", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Use the scripted echo backend instead of Gemini.
    #[arg(long = "offline")]
    pub offline: bool,

    /// Behave like a host without speech recognition or synthesis.
    #[arg(long = "no-speech")]
    pub no_speech: bool,

    /// Start directly in voice or text mode.
    #[arg(short = 'm', long = "mode", value_parser = ["voice", "text"])]
    pub mode: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MRIGA_CONFIG env var > ~/.mriga/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|name| std::env::var(name).ok())
    }

    fn resolve_config_path_with(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env("MRIGA_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path(env("HOME").or_else(|| env("USERPROFILE")))
    }

    /// Resolve the log level filter.
    ///
    /// Priority: --log-level flag > config file value. `RUST_LOG` still wins
    /// over both when the subscriber is built.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// `~/.mriga/config.toml`, or `config.toml` when no home is known.
fn default_config_path(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home).join(".mriga").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
