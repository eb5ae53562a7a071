//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Legacy fields are migrated and all settings are
//! validated at startup.

pub mod policy;
pub mod startup;

use parley_core::GenerationOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use policy::{PolicySettings, Precedence};
pub use startup::{ModeSource, apply_startup_mode, resolve_mode};

/// Floor applied to the memory token budget.
pub const MIN_MEMORY_TOKEN_BUDGET: usize = 600;

/// Which LLM backend answers invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Local,
    Online,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Online => "online",
        }
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "online" => Ok(Self::Online),
            other => Err(ConfigError::ValidationError(format!(
                "unknown mode '{other}' (expected 'local' or 'online')"
            ))),
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Master switch; a disabled agent ignores every message
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backend mode. `None` until chosen by the config file or the CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AgentMode>,

    #[serde(default = "default_local_url")]
    pub local_url: String,

    #[serde(default = "default_local_model")]
    pub local_model: String,

    #[serde(default = "default_online_url")]
    pub online_url: String,

    #[serde(default = "default_online_model")]
    pub online_model: String,

    /// API key for online mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_invocation_prefix")]
    pub invocation_prefix: String,

    /// Name matched by `@name` and `/name`
    #[serde(default = "default_mention_name")]
    pub mention_name: String,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Conversation exchanges kept verbatim (two messages each)
    #[serde(default = "default_memory_depth")]
    pub memory_depth: usize,

    /// Appended turns between rolling-summary compactions
    #[serde(default = "default_summary_frequency")]
    pub summary_frequency: u32,

    #[serde(default = "default_memory_token_budget")]
    pub memory_token_budget: usize,

    /// Legacy channel allowlist, folded into `policy.allowed_channel_ids`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_channels: Vec<String>,

    #[serde(default)]
    pub policy: PolicySettings,

    /// Channels where the model may call tools
    #[serde(default)]
    pub tool_enabled_channels: BTreeSet<String>,

    /// Guilds where the model may call tools
    #[serde(default)]
    pub tool_enabled_guilds: BTreeSet<String>,

    /// The agent's own author id; its messages are never treated as invocations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_user_id: Option<String>,

    /// HTTP timeout for LLM requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_local_url() -> String {
    "http://localhost:8000/v1/chat/completions".into()
}
fn default_local_model() -> String {
    "local-model".into()
}
fn default_online_url() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_online_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_invocation_prefix() -> String {
    "!agent".into()
}
fn default_mention_name() -> String {
    "agent".into()
}
fn default_rate_limit() -> u32 {
    8
}
fn default_memory_depth() -> usize {
    12
}
fn default_summary_frequency() -> u32 {
    6
}
fn default_memory_token_budget() -> usize {
    2400
}
fn default_request_timeout_secs() -> u64 {
    60
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSettings")
            .field("enabled", &self.enabled)
            .field("mode", &self.mode)
            .field("local_url", &self.local_url)
            .field("local_model", &self.local_model)
            .field("online_url", &self.online_url)
            .field("online_model", &self.online_model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("invocation_prefix", &self.invocation_prefix)
            .field("mention_name", &self.mention_name)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("memory_depth", &self.memory_depth)
            .field("summary_frequency", &self.summary_frequency)
            .field("memory_token_budget", &self.memory_token_budget)
            .field("enabled_channels", &self.enabled_channels)
            .field("policy", &self.policy)
            .field("tool_enabled_channels", &self.tool_enabled_channels)
            .field("tool_enabled_guilds", &self.tool_enabled_guilds)
            .field("self_user_id", &self.self_user_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl AgentSettings {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Environment overrides:
    /// - `PARLEY_MODE` (`local` | `online`)
    /// - `LOCAL_LLM_URL`
    /// - `PARLEY_API_KEY`, then `OPENAI_API_KEY` (only when the file has no key)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut settings = Self::load_from(&config_path)?;
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
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

        let mut settings: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        settings.migrate();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("PARLEY_MODE") {
            self.mode = Some(mode.parse()?);
        }

        if let Some(url) = lookup("LOCAL_LLM_URL").filter(|u| !u.trim().is_empty()) {
            self.local_url = url;
        }

        if self.api_key.is_none() {
            self.api_key = lookup("PARLEY_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Fold legacy fields into their current home and sanitize ids.
    ///
    /// Running it twice gives the same result as running it once.
    pub fn migrate(&mut self) {
        let legacy = std::mem::take(&mut self.enabled_channels);
        self.policy.allowed_channel_ids.extend(legacy);
        self.policy.sanitize();
        self.tool_enabled_channels = policy::sanitize_ids(&self.tool_enabled_channels);
        self.tool_enabled_guilds = policy::sanitize_ids(&self.tool_enabled_guilds);
        self.self_user_id = self
            .self_user_id
            .take()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit_per_minute must be at least 1".into(),
            ));
        }

        if self.mention_name.trim().trim_start_matches('@').is_empty() {
            return Err(ConfigError::ValidationError("mention_name must not be empty".into()));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// The backend mode in effect.
    pub fn active_mode(&self) -> AgentMode {
        self.mode.unwrap_or_default()
    }

    /// Model name for the active mode.
    pub fn active_model(&self) -> &str {
        match self.active_mode() {
            AgentMode::Local => &self.local_model,
            AgentMode::Online => &self.online_model,
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Token budget with the floor applied.
    pub fn effective_token_budget(&self) -> usize {
        self.memory_token_budget.max(MIN_MEMORY_TOKEN_BUDGET)
    }

    /// Summary frequency, never below one.
    pub fn effective_summary_frequency(&self) -> u32 {
        self.summary_frequency.max(1)
    }

    /// How many turns memory keeps verbatim.
    pub fn max_recent_turns(&self) -> usize {
        self.memory_depth.saturating_mul(2).max(2)
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.active_model().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let settings = Self {
            mode: Some(AgentMode::Local),
            ..Self::default()
        };
        toml::to_string_pretty(&settings).unwrap_or_default()
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: None,
            local_url: default_local_url(),
            local_model: default_local_model(),
            online_url: default_online_url(),
            online_model: default_online_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            invocation_prefix: default_invocation_prefix(),
            mention_name: default_mention_name(),
            rate_limit_per_minute: default_rate_limit(),
            memory_depth: default_memory_depth(),
            summary_frequency: default_summary_frequency(),
            memory_token_budget: default_memory_token_budget(),
            enabled_channels: vec![],
            policy: PolicySettings::default(),
            tool_enabled_channels: BTreeSet::new(),
            tool_enabled_guilds: BTreeSet::new(),
            self_user_id: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
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

impl From<ConfigError> for parley_core::Error {
    fn from(e: ConfigError) -> Self {
        parley_core::Error::Config {
            message: e.to_string(),
        }
    }
}
