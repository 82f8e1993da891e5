//! Node-addressed relay subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → target.rs (node id from query/header, loopback check, directory)
//!     → Local: application routes
//!     → Remote + WebSocket upgrade: websocket.rs (tunnel)
//!     → Remote: http.rs (single exchange)
//!     → Unknown: 500 "Node not known"
//!
//! headers.rs supplies the hop-by-hop and X-Forwarded-For rules to both
//! forwarding paths.
//! ```

pub mod error;
pub mod headers;
pub mod http;
pub mod target;
pub mod tunnel;
pub mod websocket;

pub use error::RelayError;
pub use http::HttpRelay;
pub use target::{LocalIdentity, RelayTarget, RelayTargetResolver};
pub use tunnel::TunnelTracker;
pub use websocket::WebSocketRelay;

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::directory::NodeAddressResolver;

/// Everything a node needs to relay: target resolution plus both
/// forwarding paths.
pub struct Relay {
    targets: RelayTargetResolver,
    http: HttpRelay,
    websocket: WebSocketRelay,
}

impl Relay {
    pub fn new(config: &RelayConfig, directory: Arc<dyn NodeAddressResolver>, local: LocalIdentity) -> Self {
        Self {
            targets: RelayTargetResolver::new(directory, local),
            http: HttpRelay::new(config),
            websocket: WebSocketRelay::new(config),
        }
    }

    pub fn targets(&self) -> &RelayTargetResolver {
        &self.targets
    }

    pub fn http(&self) -> &HttpRelay {
        &self.http
    }

    pub fn websocket(&self) -> &WebSocketRelay {
        &self.websocket
    }

    /// Apply reloaded relay settings to both forwarding paths.
    pub fn reconfigure(&self, config: &RelayConfig) {
        self.http.reconfigure(config);
        self.websocket.reconfigure(config);
    }
}
