//! # Stackcraft Server - Main Entry Point
//!
//! Hosts the item and entity stacking plugins on top of an in-memory world.
//! This entry point handles CLI parsing, configuration loading, logging setup
//! and the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! stackcraft
//!
//! # Specify custom configuration
//! stackcraft --config production.toml
//!
//! # Override specific settings
//! stackcraft --tick-ms 100 --log-level debug --no-simulation
//!
//! # JSON logging for production
//! stackcraft --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created. The
//! stacker sections only provide startup values; the settings registry owns
//! them once the server runs.
//!
//! ## Signal Handling
//!
//! The server shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM (Unix
//! systems). A second signal exits immediately.

use tracing::{error, info};

pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod plugins;
pub mod signals;
pub mod simulation;

use app::Application;
use cli::CliArgs;

/// Main entry point for the Stackcraft server.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Called from `main`, which owns the Tokio runtime.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let loaded = AppConfig::load_from_file(&args.config_path).await;
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AppConfig::default(),
    };
    config.apply_cli(&args);

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = loaded {
        error!("❌ Failed to load configuration from {}: {e}", args.config_path.display());
        std::process::exit(1);
    }
    info!("✅ Configuration loaded from {}", args.config_path.display());

    match Application::new(config) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for library usage
pub use app::TickDriver;
pub use config::{AppConfig, LoggingSettings, ServerSettings, SimulationSettings};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_default_config_starts_an_application() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(Application::new(config).is_ok());
    }

    #[tokio::test]
    async fn test_config_file_and_cli_combine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stackcraft.toml");
        tokio::fs::write(&path, "[logging]\nlevel = \"warn\"\n\n[server]\ntick_interval_ms = 200\n")
            .await
            .unwrap();
        let path_arg = path.to_string_lossy().to_string();
        let args = CliArgs::try_parse_from(["stackcraft", "--config", path_arg.as_str(), "--tick-ms", "25"]).unwrap();

        let mut config = AppConfig::load_from_file(&args.config_path).await.unwrap();
        config.apply_cli(&args);

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.server.tick_interval_ms, 25);
        assert!(config.validate().is_ok());
    }
}
