//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a relay node.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a relay node.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayNodeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Relay behaviour (timeouts, local aliases).
    pub relay: RelayConfig,

    /// Static node directory.
    pub directory: DirectoryConfig,

    /// Timeout configuration for locally served requests.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6457").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6457".to_string(),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Timeout for a relayed HTTP exchange (until response headers) in seconds.
    pub request_timeout_secs: u64,

    /// Timeout for dialing a remote WebSocket in seconds.
    pub connect_timeout_secs: u64,

    /// Idle timeout per tunnel direction in seconds. 0 disables it.
    pub websocket_idle_timeout_secs: u64,

    /// Extra identifiers/addresses under which this node reaches itself.
    pub local_aliases: Vec<String>,
}

impl RelayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn websocket_idle_timeout(&self) -> Option<Duration> {
        match self.websocket_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 20,
            connect_timeout_secs: 5,
            websocket_idle_timeout_secs: 0,
            local_aliases: Vec::new(),
        }
    }
}

/// Static node directory: node id -> "host:port".
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    pub nodes: BTreeMap<String, String>,
}

/// Timeout configuration for locally served requests.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
