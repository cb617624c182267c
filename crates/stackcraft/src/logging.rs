//! Logging system setup and configuration.
//!
//! Initializes the tracing-based logging system with human-readable or JSON
//! output. `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global subscriber.
///
/// Fails when a global subscriber is already installed.
pub fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Displays the startup banner.
pub fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║           📦 STACKCRAFT SERVER 🐄        ║");
    info!("║                 v{:<8}                ║", version);
    info!("║                                          ║");
    info!("║  Item stacking with expiring groups      ║");
    info!("║  Mob stacking with named stacks          ║");
    info!("║  Live settings for every plugin          ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
