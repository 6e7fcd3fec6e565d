//! Configuration loading, validation, and management for tracefold.
//!
//! Loads configuration from `~/.tracefold/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tracefold/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion provider settings
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Web search backend settings
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-surface loop and lifecycle budgets
    #[serde(default)]
    pub surfaces: SurfacesConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Provider ────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Allow cross-origin requests from browser front-ends
    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_port() -> u16 {
    4317
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors: true,
        }
    }
}

// ── Search ──────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,

    /// Results per query when the model does not ask for a number
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// "basic" or "advanced"
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
}

fn default_search_url() -> String {
    "https://api.tavily.com".into()
}
fn default_max_results() -> u32 {
    5
}
fn default_search_depth() -> String {
    "basic".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_search_url(),
            max_results: default_max_results(),
            search_depth: default_search_depth(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_results", &self.max_results)
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

// ── Logging ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Default filter directive when `RUST_LOG` is unset (e.g. "info")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

// ── Surfaces ────────────────────────────────────────────────────────────

/// Loop and lifecycle budget for one surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Model round-trips before the loop stops
    pub max_steps: usize,

    /// Wall-clock budget of one HTTP request
    pub max_duration_secs: u64,

    /// Deadline armed by the lifecycle controller
    pub timeout_ms: u64,

    pub max_retries: u32,

    /// Base backoff; attempt `n` waits `n * retry_delay_ms`
    pub retry_delay_ms: u64,
}

impl SurfaceConfig {
    pub fn chat() -> Self {
        Self {
            max_steps: 100,
            max_duration_secs: 30,
            timeout_ms: 60_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }

    pub fn dev() -> Self {
        Self {
            max_steps: 100,
            max_duration_secs: 60,
            timeout_ms: 120_000,
            max_retries: 2,
            retry_delay_ms: 2_000,
        }
    }

    pub fn research() -> Self {
        Self {
            max_steps: 100,
            max_duration_secs: 60,
            timeout_ms: 60_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::ValidationError(format!(
                "surfaces.{name}.max_steps must be > 0"
            )));
        }
        if self.max_duration_secs == 0 || self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "surfaces.{name} time budgets must be > 0"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfacesConfig {
    #[serde(default = "SurfaceConfig::chat")]
    pub chat: SurfaceConfig,

    #[serde(default = "SurfaceConfig::dev")]
    pub dev: SurfaceConfig,

    #[serde(default = "SurfaceConfig::research")]
    pub research: SurfaceConfig,
}

impl Default for SurfacesConfig {
    fn default() -> Self {
        Self {
            chat: SurfaceConfig::chat(),
            dev: SurfaceConfig::dev(),
            research: SurfaceConfig::research(),
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.tracefold/config.toml).
    ///
    /// Environment overrides:
    /// - `TRACEFOLD_API_KEY`, then `OPENAI_API_KEY` (when the file has no key)
    /// - `TRACEFOLD_MODEL`, then `OPENAI_MODEL`
    /// - `TAVILY_API_KEY` (when the file has no search key)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key =
                lookup("TRACEFOLD_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("TRACEFOLD_MODEL").or_else(|| lookup("OPENAI_MODEL")) {
            self.provider.model = model;
        }

        if self.search.api_key.is_none() {
            self.search.api_key = lookup("TAVILY_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tracefold")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.search.max_results > 20 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be at most 20".into(),
            ));
        }

        self.surfaces.chat.validate("chat")?;
        self.surfaces.dev.validate("dev")?;
        self.surfaces.research.validate("research")?;
        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
