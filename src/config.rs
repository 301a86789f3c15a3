//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`COLLOQUY_BACKEND_URL`,
//!    `COLLOQUY_REQUEST_TIMEOUT_SECS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./colloquy.toml in the current directory
//! 4. $XDG_CONFIG_HOME/colloquy/colloquy.toml (or
//!    ~/.config/colloquy/colloquy.toml)
//! 5. Built-in defaults

use crate::error::ConfigError;
use crate::poller::PollIntervals;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STEP_INTERVAL_MS: u64 = 500;
const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;
const DEFAULT_TITLE_DEBOUNCE_MS: u64 = 3000;
const DEFAULT_TITLE_MIN_MESSAGES: usize = 2;

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub title: TitleConfig,
    pub display: DisplayConfig,
}

/// Backend connection settings used by the HTTP transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the agent service.
    pub base_url: String,
    /// Timeout for bounded JSON requests. Streamed result bodies are exempt.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Probe cadences for deferred requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Reasoning-step probe period.
    pub step_interval_ms: u64,
    /// Completion-status probe period.
    pub status_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

impl PollingConfig {
    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            step: Duration::from_millis(self.step_interval_ms.max(1)),
            status: Duration::from_millis(self.status_interval_ms.max(1)),
        }
    }
}

/// Debounced title-generation policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    /// Quiet period after the trigger before the title request fires.
    pub debounce_ms: u64,
    /// Minimum transcript length before a title is worth generating.
    pub min_messages: usize,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_TITLE_DEBOUNCE_MS,
            min_messages: DEFAULT_TITLE_MIN_MESSAGES,
        }
    }
}

impl TitleConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Display / rendering preferences.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
    /// Render reasoning steps under finished assistant messages.
    pub show_thinking: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            show_thinking: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    let config_text = if let Some(p) = path_override {
        // Explicit path, fail if it doesn't exist.
        std::fs::read_to_string(p)?
    } else if let Ok(text) = std::fs::read_to_string("colloquy.toml") {
        text
    } else if let Some(path) = default_global_config_path() {
        std::fs::read_to_string(path).unwrap_or_default()
    } else {
        String::new()
    };

    parse_config(&config_text, |name| std::env::var(name).ok())
}

/// Return the default per-user config path
/// (`~/.config/colloquy/colloquy.toml`).
pub fn default_global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("colloquy").join("colloquy.toml"))
}

/// Parse config text and apply environment overrides via `env_lookup`.
fn parse_config(
    text: &str,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(text)?;

    if let Some(url) = env_lookup("COLLOQUY_BACKEND_URL") {
        config.backend.base_url = url;
    }
    if let Some(timeout) = env_lookup("COLLOQUY_REQUEST_TIMEOUT_SECS") {
        let parsed = timeout.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid COLLOQUY_REQUEST_TIMEOUT_SECS value `{timeout}`: expected positive integer seconds"
            ))
        })?;
        config.backend.request_timeout_secs = parsed.max(1);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.backend.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "backend.base_url must not be empty".to_string(),
        ));
    }
    if config.polling.step_interval_ms == 0 || config.polling.status_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "polling intervals must be at least 1ms".to_string(),
        ));
    }
    Ok(())
}
