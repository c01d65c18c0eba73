mod compaction;
mod observability;
mod tools;
mod turn;

pub use compaction::*;
pub use observability::*;
pub use tools::*;
pub use turn::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.turn.max_tool_loops == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "turn.max_tool_loops".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.turn.channel_capacity == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "turn.channel_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.turn.default_model.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "turn.default_model".into(),
                message: "default model must not be empty".into(),
            });
        }

        // Compaction must leave something to summarize.
        if self.compaction.keep_recent >= self.compaction.threshold {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "compaction.keep_recent".into(),
                message: format!(
                    "keep_recent ({}) must be smaller than threshold ({})",
                    self.compaction.keep_recent, self.compaction.threshold
                ),
            });
        }

        if self.compaction.keep_recent == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "compaction.keep_recent".into(),
                message: "compaction will replace the whole history with a summary".into(),
            });
        }

        if self.tools.knowledge_prefix.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tools.knowledge_prefix".into(),
                message: "knowledge prefix must not be empty".into(),
            });
        }

        if self.tools.request_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "tools.request_timeout_secs".into(),
                message: "a zero timeout fails every remote tool call".into(),
            });
        }

        errors
    }
}
