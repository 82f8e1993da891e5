//! Shutdown coordination for a relay node.
//!
//! Stopping runs in two steps. First the listener stops accepting and
//! in-flight HTTP exchanges finish (axum graceful shutdown). Then open
//! WebSocket tunnels get a bounded window to close on their own, since
//! hyper no longer tracks upgraded connections.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::relay::TunnelTracker;

/// How long shutdown waits for open tunnels.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_secs(5);

/// One trigger fans out to the server and the config fan-out task.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait up to `window` for every tunnel to finish.
///
/// Returns how many tunnels were still open when the window closed.
pub async fn drain_tunnels(tunnels: &TunnelTracker, window: Duration) -> u64 {
    let open = tunnels.active_count();
    if open == 0 {
        return 0;
    }

    tracing::info!(open, window = ?window, "Waiting for WebSocket tunnels to close");
    if tunnels.wait_idle(window).await {
        tracing::info!("All tunnels closed");
        return 0;
    }

    let left = tunnels.active_count();
    tracing::warn!(left, "Tunnels still open at shutdown");
    left
}
