//! Configuration loading, validation, and management for PromptChain.
//!
//! Loads configuration from `~/.promptchain/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptchain/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider used for block set execution
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Persistence configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Completion call settings
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Chain engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
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
            .field("default_provider", &self.default_provider)
            .field("store", &self.store)
            .field("completion", &self.completion)
            .field("engine", &self.engine)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file; relative paths resolve against the config dir
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_database_path() -> String {
    "promptchain.sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_database_path(),
        }
    }
}

impl StoreConfig {
    /// The database location to hand to the SQLite backend.
    pub fn database_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() || self.path.starts_with("sqlite:") {
            path
        } else {
            AppConfig::config_dir().join(path)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Upper bound on a single completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Model for newly created completer blocks
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature for newly created completer blocks
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    1.0
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            default_model: default_model(),
            default_temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How often a block set move is retried after losing a concurrent race
    #[serde(default = "default_max_move_retries")]
    pub max_move_retries: u32,
}

fn default_max_move_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_move_retries: default_max_move_retries(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.promptchain/config.toml).
    ///
    /// Environment variables override the file:
    /// - `PROMPTCHAIN_API_KEY`, then `OPENAI_API_KEY`
    /// - `PROMPTCHAIN_PROVIDER`
    /// - `PROMPTCHAIN_DATABASE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("PROMPTCHAIN_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("PROMPTCHAIN_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(path) = lookup("PROMPTCHAIN_DATABASE") {
            self.store.path = path;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptchain")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let temperature = self.completion.default_temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::ValidationError(
                "completion.default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.completion.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "completion.timeout_secs must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected \"sqlite\" or \"memory\")",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
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
            default_provider: default_provider(),
            store: StoreConfig::default(),
            completion: CompletionConfig::default(),
            engine: EngineConfig::default(),
            providers: HashMap::new(),
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
