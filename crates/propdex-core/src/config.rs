//! Configuration for the Propdex engine.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Modules indexed at startup
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Class graph nodes kept per module
    #[serde(default = "default_cache_capacity")]
    pub class_graph_cache_capacity: usize,

    /// Quiet period before a batch of classpath changes triggers a pass
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Follow symbolic links while discovering sources
    #[serde(default)]
    pub follow_symlinks: bool,
}

/// One compilation unit and its classpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub id: String,

    /// Directory or archive roots
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Extra type catalogs beyond those found in the roots
    #[serde(default)]
    pub type_catalogs: Vec<PathBuf>,
}

fn default_cache_capacity() -> usize {
    512
}

fn default_watch_debounce_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Directory holding the user configuration.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".propdex")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            class_graph_cache_capacity: default_cache_capacity(),
            watch_debounce_ms: default_watch_debounce_ms(),
            log_level: default_log_level(),
            follow_symlinks: false,
        }
    }
}

impl EngineConfig {
    /// Load `~/.propdex/config.yaml`, falling back to defaults
    pub fn load() -> Self {
        let config_path = default_config_dir().join("config.yaml");

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = ?config_path, error = %e, "Failed to load config file");
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::new();
        for module in &self.modules {
            if module.id.trim().is_empty() {
                return Err(CoreError::Config("module id must not be empty".to_string()));
            }
            if !seen.insert(module.id.as_str()) {
                return Err(CoreError::Config(format!("module {} declared twice", module.id)));
            }
        }
        Ok(())
    }

    pub fn module(&self, id: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.id == id)
    }
}
