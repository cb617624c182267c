//! Signal handling for graceful server shutdown.
//!
//! Waits for SIGINT or SIGTERM on Unix and Ctrl+C on Windows, then flips the
//! shared [`ShutdownState`] so the tick loop stops scheduling ticks.

use stackcraft_events::ShutdownState;
use tokio::signal;
use tracing::info;

/// Resolves once a termination signal arrives and marks `shutdown_state`.
pub async fn wait_for_shutdown_signal(
    shutdown_state: &ShutdownState,
) -> Result<(), Box<dyn std::error::Error>> {
    wait_for_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    shutdown_state.initiate_shutdown();
    Ok(())
}

/// Resolves once a termination signal arrives, without logging.
pub async fn wait_for_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}
