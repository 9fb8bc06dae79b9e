#[cfg(test)]
#[path = "shutdown_test.rs"]
mod tests;

use std::io;

/// Resolves once `signal` fires. A signal listener that fails to install
/// never resolves, so the server keeps running instead of stopping at
/// startup.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => log::info!("Shutdown signal received, draining connections"),
        Err(err) => {
            log::error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await
        }
    }
}
