//! Configuration loading and validation for ProcureSense.
//!
//! Loads configuration from `~/.procuresense/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `context.total_budget`.
pub const ENV_CONTEXT_BUDGET: &str = "PROCURESENSE_CONTEXT_BUDGET";
/// Environment variable overriding `policy.rules_file`.
pub const ENV_RULES_FILE: &str = "PROCURESENSE_RULES_FILE";
/// Environment variable overriding `critic.auto_revision`.
pub const ENV_AUTO_REVISION: &str = "PROCURESENSE_AUTO_REVISION";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "PROCURESENSE_LOG_LEVEL";

/// The root configuration structure.
///
/// Maps directly to `~/.procuresense/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub critic: CriticConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Token budgeting for layered contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total token budget split across the four tiers.
    #[serde(default = "default_total_budget")]
    pub total_budget: i64,
}

fn default_total_budget() -> i64 {
    2000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            total_budget: default_total_budget(),
        }
    }
}

/// Where the enterprise ruleset comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Ruleset TOML file. The built-in enterprise ruleset is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Apply deterministic fixes; when false every violation is flagged.
    #[serde(default = "default_true")]
    pub auto_revision: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            auto_revision: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `procuresense_context=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path with environment overrides.
    ///
    /// Environment variables (highest priority):
    /// - `PROCURESENSE_CONTEXT_BUDGET`
    /// - `PROCURESENSE_RULES_FILE`
    /// - `PROCURESENSE_AUTO_REVISION`
    /// - `PROCURESENSE_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(budget) = lookup(ENV_CONTEXT_BUDGET) {
            self.context.total_budget = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "{ENV_CONTEXT_BUDGET} must be an integer, got {budget:?}"
                ))
            })?;
        }

        if let Some(path) = lookup(ENV_RULES_FILE).filter(|p| !p.trim().is_empty()) {
            self.policy.rules_file = Some(PathBuf::from(path));
        }

        if let Some(flag) = lookup(ENV_AUTO_REVISION) {
            self.critic.auto_revision = parse_bool(&flag).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "{ENV_AUTO_REVISION} must be true or false, got {flag:?}"
                ))
            })?;
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".procuresense")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.total_budget <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "context.total_budget must be positive, got {}",
                self.context.total_budget
            )));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level cannot be empty".into(),
            ));
        }

        if let Some(path) = &self.policy.rules_file {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "policy.rules_file cannot be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
