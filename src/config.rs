use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Engine configuration loaded from `~/.dictation-settings.toml`
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Telemetry/logging options
    pub telemetry: TelemetryConfig,
    /// Settings store location
    pub store: StoreConfig,
    /// Download backend options
    pub downloads: DownloadConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Log to a file instead of stdout
    pub enabled: bool,
    /// Log file location (supports `~`)
    pub log_path: String,
}

/// Where the persisted settings snapshot lives
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Settings file location (supports `~`)
    pub path: String,
}

/// Model download backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    /// Base URL model files are fetched from
    pub base_url: String,
    /// Directory model files are stored in (supports `~`)
    pub models_dir: String,
    /// Milliseconds before a cancelled download clears back to idle
    pub cancel_clear_ms: u64,
}

impl Config {
    /// Load config from ~/.dictation-settings.toml
    ///
    /// # Errors
    /// Returns error when the file cannot be created, read, or parsed.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".dictation-settings.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        let default_config = r#"[telemetry]
enabled = false
log_path = "~/.dictation-settings/engine.log"

[store]
path = "~/.dictation-settings/settings.toml"

[downloads]
base_url = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main"
models_dir = "~/.dictation-settings/models"
cancel_clear_ms = 3000
"#;
        fs::write(path, default_config).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error when `HOME` is not set.
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
