//! Configuration management for the Stackcraft server.
//!
//! This module handles loading, validation, and CLI overrides of the server
//! configuration from TOML files. The stacker sections are only the startup
//! values: they are seeded into the settings registry, which is authoritative
//! from then on.

use crate::cli::CliArgs;
use plugin_entity_stacker::EntityStackerSettings;
use plugin_item_stacker::ItemStackerSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server loop settings
    pub server: ServerSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Demo drop spawner
    pub simulation: SimulationSettings,
    /// Startup settings of the item stacker
    pub item_stacker: ItemStackerSettings,
    /// Startup settings of the entity stacker
    pub entity_stacker: EntityStackerSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Seconds between health reports
    pub monitoring_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50, // 20 ticks per second
            monitoring_interval_secs: 60,
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Settings of the simulated drops and mobs that exercise the stackers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub enabled: bool,
    /// Ticks between two drop waves
    pub drop_interval_ticks: u64,
    /// Item drops per wave
    pub drops_per_wave: u32,
    /// Half width of the square around the origin drops land in
    pub spread: f64,
    /// Item types picked from at random
    pub item_types: Vec<String>,
    /// Largest amount of a single drop
    pub max_drop_amount: u32,
    /// Mob types picked from at random
    pub mob_types: Vec<String>,
    /// Chance per wave to spawn a mob
    pub mob_chance: f64,
    /// Chance per wave to kill a mob
    pub kill_chance: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_interval_ticks: 40,
            drops_per_wave: 3,
            spread: 6.0,
            item_types: vec![
                "minecraft:cobblestone".to_string(),
                "minecraft:oak_log".to_string(),
                "minecraft:rotten_flesh".to_string(),
            ],
            max_drop_amount: 16,
            mob_types: vec!["minecraft:zombie".to_string(), "minecraft:cow".to_string()],
            mob_chance: 0.5,
            kill_chance: 0.2,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if let Some(tick_ms) = args.tick_ms {
            self.server.tick_interval_ms = tick_ms;
        }
        if args.no_simulation {
            self.simulation.enabled = false;
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.tick_interval_ms == 0 {
            return Err("server.tick_interval_ms must be greater than 0".to_string());
        }
        if self.server.monitoring_interval_secs == 0 {
            return Err("server.monitoring_interval_secs must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.item_stacker
            .validate()
            .map_err(|e| format!("item_stacker: {e}"))?;
        self.entity_stacker
            .validate()
            .map_err(|e| format!("entity_stacker: {e}"))?;

        let simulation = &self.simulation;
        if simulation.enabled {
            if simulation.drop_interval_ticks == 0 {
                return Err("simulation.drop_interval_ticks must be greater than 0".to_string());
            }
            if simulation.item_types.is_empty() {
                return Err("simulation.item_types must not be empty".to_string());
            }
            if simulation.max_drop_amount == 0 {
                return Err("simulation.max_drop_amount must be greater than 0".to_string());
            }
            if !(simulation.spread >= 0.0) {
                return Err("simulation.spread must not be negative".to_string());
            }
            for (name, chance) in [("mob_chance", simulation.mob_chance), ("kill_chance", simulation.kill_chance)] {
                if !(0.0..=1.0).contains(&chance) {
                    return Err(format!("simulation.{name} must be between 0 and 1"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.simulation.enabled);
        assert_eq!(config.item_stacker, ItemStackerSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.item_stacker.min_distance = 20.0;
        let err = config.validate().unwrap_err();
        assert!(err.starts_with("item_stacker:"));

        let mut config = AppConfig::default();
        config.item_stacker.check_interval_ticks = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.item_stacker.expire_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.entity_stacker.check_interval_ticks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_simulation_is_not_checked() {
        let mut config = AppConfig::default();
        config.simulation.item_types.clear();
        assert!(config.validate().is_err());
        config.simulation.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: "config.toml".into(),
            log_level: Some("debug".to_string()),
            json_logs: true,
            tick_ms: Some(25),
            no_simulation: true,
        };
        config.apply_cli(&args);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.server.tick_interval_ms, 25);
        assert!(!config.simulation.enabled);
    }

    #[tokio::test]
    async fn test_missing_file_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(config, AppConfig::default());
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let reparsed: AppConfig = toml::from_str(&written).unwrap();
        assert_eq!(reparsed, config);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(
            file.path(),
            "[server]\ntick_interval_ms = 100\n\n[item_stacker]\nmax_distance = 4.5\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).await.unwrap();

        assert_eq!(config.server.tick_interval_ms, 100);
        assert_eq!(config.item_stacker.max_distance, 4.5);
        assert_eq!(config.item_stacker.min_distance, 0.1);
        assert_eq!(config.entity_stacker, EntityStackerSettings::default());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "[server\ntick_interval_ms = ").await.unwrap();
        assert!(AppConfig::load_from_file(file.path()).await.is_err());
    }
}
