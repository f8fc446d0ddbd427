//! Configuration types for the brain host.

use crate::ability::AbilityOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration for the brain host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Per-ability option overrides, keyed by ability name.
    ///
    /// ```toml
    /// [abilities.Understanding]
    /// auto_start = true
    /// ```
    pub abilities: BTreeMap<String, AbilityOptions>,
    /// Host command/event channel settings.
    pub host: HostConfig,
    /// Memory pressure ability settings.
    pub memory_pressure: MemoryPressureConfig,
}

/// Host bridge channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Capacity of the broadcast channel carrying ability events.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            event_capacity: 128,
        }
    }
}

/// Memory pressure monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPressureConfig {
    /// Seconds between available-RAM samples.
    pub poll_interval_secs: u64,
    /// Available RAM (MiB) at or below which the level is Warning.
    pub warning_threshold_mb: u64,
    /// Available RAM (MiB) at or below which the level is Critical.
    pub critical_threshold_mb: u64,
}

impl Default for MemoryPressureConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            warning_threshold_mb: 1_024,
            critical_threshold_mb: 512,
        }
    }
}

impl BrainConfig {
    /// Options for `name`: the configured override if present, else `fallback`.
    #[must_use]
    pub fn ability_options(&self, name: &str, fallback: AbilityOptions) -> AbilityOptions {
        self.abilities.get(name).copied().unwrap_or(fallback)
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BrainError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BrainError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/brain/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("brain").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("brain")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/brain-config/config.toml")
        }
    }
}
