mod logging;
mod store;

pub use logging::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Longest store timeout that does not draw a warning.
const MAX_SANE_TIMEOUT_MS: u64 = 10_000;

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

        if self.store.timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.timeout_ms".into(),
                message: "timeout must be greater than 0".into(),
            });
        } else if self.store.timeout_ms > MAX_SANE_TIMEOUT_MS {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "store.timeout_ms".into(),
                message: format!(
                    "{}ms is long for a per-request quota check; callers wait this long before failing open",
                    self.store.timeout_ms
                ),
            });
        }

        match self.store.backend {
            StoreBackend::File if self.store.state_path.as_os_str().is_empty() => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "store.state_path".into(),
                    message: "state_path must not be empty for the file backend".into(),
                });
            }
            StoreBackend::Memory => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "store.backend".into(),
                    message: "memory backend keeps nothing between invocations".into(),
                });
            }
            StoreBackend::File => {}
        }

        if self.logging.filter.trim().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "logging.filter".into(),
                message: "empty filter; falling back to \"warn\"".into(),
            });
        }

        errors
    }
}
