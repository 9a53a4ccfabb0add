//! Helpers around the shared shutdown signal.
//!
//! The signal is a `watch::Receiver<bool>`. `true` means shut down. A
//! dropped sender is treated the same way so orphaned tasks never spin.

use tokio::sync::watch;

/// Whether shutdown has already been requested.
pub fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Resolve once shutdown has been requested.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
