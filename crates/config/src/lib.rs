//! Configuration loading, validation, and management for TaskTier.
//!
//! Loads configuration from `<project_root>/tasktier.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "tasktier.toml";

/// The root configuration structure.
///
/// Maps directly to `tasktier.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override for the Messages API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("store", &self.store)
            .field("context", &self.context)
            .finish()
    }
}

/// The agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Tool rounds allowed inside one submit before the loop stops
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Provider-reported tokens a session may spend before a submit stops
    /// with a budget exhaustion; unset means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_session_tokens: Option<u64>,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_tool_rounds() -> usize {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            max_session_tokens: None,
        }
    }
}

/// Tool executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default `run` timeout when the call gives none
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Upper clamp on any per-call `run` timeout
    #[serde(default = "default_max_command_timeout")]
    pub max_command_timeout_secs: u64,

    /// Captured output per stream is cut beyond this
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_command_timeout() -> u64 {
    30
}
fn default_max_command_timeout() -> u64 {
    300
}
fn default_max_output_bytes() -> usize {
    64 * 1024
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            max_command_timeout_secs: default_max_command_timeout(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// On-disk layout, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_records_dir")]
    pub records_dir: String,

    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
}

fn default_records_dir() -> String {
    "memories/tasks".into()
}
fn default_skills_dir() -> String {
    "skills".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            records_dir: default_records_dir(),
            skills_dir: default_skills_dir(),
        }
    }
}

/// The always-loaded preamble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Context files relative to the project root, in prompt order
    #[serde(default = "default_context_files")]
    pub files: Vec<String>,

    #[serde(default = "default_context_max_bytes")]
    pub max_bytes: usize,

    /// Replaces the built-in base prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_context_files() -> Vec<String> {
    vec![tasktier_core::context::CONTEXT_FILE.into()]
}
fn default_context_max_bytes() -> usize {
    tasktier_core::context::DEFAULT_MAX_BYTES
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            files: default_context_files(),
            max_bytes: default_context_max_bytes(),
            system_prompt: None,
        }
    }
}

impl AppConfig {
    /// Load `tasktier.toml` from the project root, then apply environment
    /// overrides:
    /// - `TASKTIER_API_KEY`, falling back to `ANTHROPIC_API_KEY`
    /// - `TASKTIER_MODEL`
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path(project_root))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. A missing file yields
    /// defaults.
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

    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_FILE)
    }

    /// Environment overrides; `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TASKTIER_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        }
        if let Some(model) = lookup("TASKTIER_MODEL") {
            self.agent.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 1.0".into(),
            ));
        }
        if self.agent.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tokens must be > 0".into(),
            ));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be > 0".into(),
            ));
        }
        if self.agent.max_session_tokens == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.max_session_tokens must be > 0 when set".into(),
            ));
        }
        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be > 0".into(),
            ));
        }
        if self.tools.command_timeout_secs > self.tools.max_command_timeout_secs {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must not exceed tools.max_command_timeout_secs"
                    .into(),
            ));
        }
        if self.store.records_dir.trim().is_empty() || self.store.skills_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "store directories must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Default config as TOML, for writing a starter file.
    pub fn default_toml() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::SerializeError(e.to_string()))
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

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}
