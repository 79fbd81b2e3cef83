//! Configuration loading, validation, and management for Operative.
//!
//! Loads configuration from `~/.operative/config.toml` with environment
//! variable overrides, validates it, and converts the `[budget]` section into
//! the core [`Budget`].

use operative_core::Budget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.operative/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperativeConfig {
    /// System prompt seeded into fresh conversations
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Resource limits for each run
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Tool allow/deny and failure policies
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help you answer.".into()
}

/// `[budget]` section. Absent keys leave that dimension unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_turn: Option<u64>,

    /// Wall-clock limit for a whole run, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u64>,

    #[serde(default = "default_pressure_threshold")]
    pub pressure_threshold: f64,
}

fn default_pressure_threshold() -> f64 {
    0.8
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            max_tokens: None,
            max_tokens_per_turn: None,
            timeout_secs: None,
            context_window_tokens: None,
            pressure_threshold: default_pressure_threshold(),
        }
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// If non-empty, only these tools may run (`"*"` allows all)
    #[serde(default)]
    pub allow: Vec<String>,

    /// Tools that are always rejected
    #[serde(default)]
    pub deny: Vec<String>,

    /// Tools whose failures end the run instead of being fed back
    #[serde(default)]
    pub fatal: Vec<String>,
}

impl OperativeConfig {
    /// Load configuration from the default path (~/.operative/config.toml),
    /// then apply environment overrides:
    /// - `OPERATIVE_SYSTEM_PROMPT`
    /// - `OPERATIVE_MAX_TURNS`
    /// - `OPERATIVE_MAX_TOKENS`
    /// - `OPERATIVE_TIMEOUT_SECS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
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

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment, in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prompt) = lookup("OPERATIVE_SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(raw) = lookup("OPERATIVE_MAX_TURNS") {
            self.budget.max_turns = Some(parse_override("OPERATIVE_MAX_TURNS", &raw)?);
        }
        if let Some(raw) = lookup("OPERATIVE_MAX_TOKENS") {
            self.budget.max_tokens = Some(parse_override("OPERATIVE_MAX_TOKENS", &raw)?);
        }
        if let Some(raw) = lookup("OPERATIVE_TIMEOUT_SECS") {
            self.budget.timeout_secs = Some(parse_override("OPERATIVE_TIMEOUT_SECS", &raw)?);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".operative")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.budget.pressure_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::ValidationError(
                "budget.pressure_threshold must be a finite number >= 0.0".into(),
            ));
        }

        if self.budget.max_turns == Some(0) {
            return Err(ConfigError::ValidationError(
                "budget.max_turns must be at least 1".into(),
            ));
        }

        if self.budget.timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "budget.timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(name) = self.tools.allow.iter().find(|n| self.tools.deny.contains(n)) {
            return Err(ConfigError::ValidationError(format!(
                "tool '{name}' is both allowed and denied"
            )));
        }

        Ok(())
    }

    /// The run budget described by the `[budget]` section.
    pub fn budget(&self) -> Budget {
        let b = &self.budget;
        Budget {
            max_turns: b.max_turns,
            max_tokens: b.max_tokens,
            max_tokens_per_turn: b.max_tokens_per_turn,
            timeout: b.timeout_secs.map(Duration::from_secs),
            context_window_tokens: b.context_window_tokens,
            pressure_threshold: b.pressure_threshold,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for OperativeConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            budget: BudgetConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{raw}'")))
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
