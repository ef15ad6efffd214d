//! Configuration loading, validation, and management for stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Directory the agents work in (prompts reference it, shell runs in it)
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub flow: FlowSection,

    #[serde(default)]
    pub interaction: InteractionSection,

    #[serde(default)]
    pub tools: ToolsSection,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_workspace_root() -> PathBuf {
    AppConfig::config_dir().join("workspace")
}

/// Redact a secret string for Debug output.
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
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("workspace_root", &self.workspace_root)
            .field("agent", &self.agent)
            .field("flow", &self.flow)
            .field("interaction", &self.interaction)
            .field("tools", &self.tools)
            .finish()
    }
}

/// Step-loop limits for a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Identical consecutive think outputs that count as stuck
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: usize,

    /// Tool observations longer than this are truncated (characters)
    #[serde(default = "default_max_observe")]
    pub max_observe: usize,
}

fn default_max_steps() -> usize {
    20
}
fn default_duplicate_threshold() -> usize {
    2
}
fn default_max_observe() -> usize {
    10_000
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            duplicate_threshold: default_duplicate_threshold(),
            max_observe: default_max_observe(),
        }
    }
}

/// Where plans live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSection {
    /// Step limit for each executor agent run inside a flow
    #[serde(default = "default_executor_max_steps")]
    pub executor_max_steps: usize,

    #[serde(default)]
    pub plan_store: PlanStoreKind,

    /// Directory for `plan_store = "file"`
    #[serde(default = "default_plan_dir")]
    pub plan_dir: PathBuf,
}

fn default_executor_max_steps() -> usize {
    30
}
fn default_plan_dir() -> PathBuf {
    AppConfig::config_dir().join("plans")
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            executor_max_steps: default_executor_max_steps(),
            plan_store: PlanStoreKind::default(),
            plan_dir: default_plan_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSection {
    /// How long a paused task waits for the operator's answer
    #[serde(default = "default_interaction_timeout")]
    pub timeout_secs: u64,
}

fn default_interaction_timeout() -> u64 {
    3600
}

impl Default for InteractionSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_interaction_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_true")]
    pub shell_enabled: bool,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_shell_timeout() -> u64 {
    60
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            shell_enabled: true,
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment variables override the file:
    /// - `STEPWISE_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `STEPWISE_MODEL`
    /// - `STEPWISE_API_URL`
    /// - `STEPWISE_WORKSPACE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply overrides from a variable lookup (the process environment in
    /// `load`, a map in tests).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("STEPWISE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("STEPWISE_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("STEPWISE_API_URL") {
            self.api_url = url;
        }
        if let Some(workspace) = lookup("STEPWISE_WORKSPACE") {
            self.workspace_root = PathBuf::from(workspace);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }
        if self.agent.duplicate_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "agent.duplicate_threshold must be at least 1".into(),
            ));
        }
        if self.flow.executor_max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "flow.executor_max_steps must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            workspace_root: default_workspace_root(),
            agent: AgentSection::default(),
            flow: FlowSection::default(),
            interaction: InteractionSection::default(),
            tools: ToolsSection::default(),
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
