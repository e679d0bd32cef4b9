//! Hub handle for observing and stopping a running hub.
//!
//! [`Hub::run`](super::Hub::run) holds `&mut Hub` for as long as it runs, so
//! callers that need to watch it (signal handlers, tests, embedders) take a
//! `HubHandle` first. The handle is `Clone + Send + Sync`.
//!
//! ```ignore
//! let handle = hub.handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.shutdown();
//! });
//! hub.run(server).await;
//! ```

// Rust guideline compliant 2026-01-23

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::lifecycle::ConnectionState;
use crate::transport::TransportManager;

/// Cloneable view of a hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    pub(super) state: watch::Receiver<ConnectionState>,
    pub(super) shutdown: CancellationToken,
    pub(super) transports: TransportManager,
}

impl HubHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the hub reaches `target`.
    ///
    /// Returns `false` if the hub was dropped first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| *s == target).await.is_ok();
        reached
    }

    /// Ask the hub to stop: the current connection closes, every transport
    /// binding is torn down, and `run` returns.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The hub's transport manager.
    pub fn transports(&self) -> &TransportManager {
        &self.transports
    }
}
