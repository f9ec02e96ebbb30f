use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store backends
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where policies, usage, and unblock grants are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory holding `policies.json`, `usage.json`, and `overrides.json`
    /// for the `file` backend.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// Upper bound on any single store call.  A call that runs longer is
    /// treated as a store failure.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            state_path: d_state_path(),
            timeout_ms: d_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON documents on disk.
    #[default]
    File,
    /// Process-local maps; nothing survives the process.
    Memory,
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}

fn d_timeout_ms() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.backend, StoreBackend::File);
        assert_eq!(cfg.state_path, PathBuf::from("./data"));
        assert_eq!(cfg.timeout(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn deserialize_memory_backend() {
        let cfg: StoreConfig = toml::from_str(
            r#"
            backend = "memory"
            timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend, StoreBackend::Memory);
        assert_eq!(cfg.timeout_ms, 250);
        assert_eq!(cfg.state_path, PathBuf::from("./data"));
    }
}
