// Signal handling module
//
// Supported signals:
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)

use std::sync::Arc;

use crate::logger::Logger;

/// Resolves once a shutdown signal arrives
#[cfg(unix)]
pub async fn shutdown_signal(logger: Arc<Logger>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            logger.warn(&format!("Failed to register SIGTERM handler: {e}"));
            wait_for_ctrl_c(&logger).await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => logger.info("SIGTERM received, shutting down"),
        () = wait_for_ctrl_c(&logger) => {}
    }
}

/// Non-unix fallback, only Ctrl+C is supported
#[cfg(not(unix))]
pub async fn shutdown_signal(logger: Arc<Logger>) {
    wait_for_ctrl_c(&logger).await;
}

async fn wait_for_ctrl_c(logger: &Logger) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => logger.info("SIGINT received, shutting down"),
        Err(e) => {
            logger.error(&format!("Failed to listen for Ctrl+C: {e}"));
            // Without a signal source, run until killed
            std::future::pending::<()>().await;
        }
    }
}
