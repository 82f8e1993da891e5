//! Configuration validation.
//!
//! Serde handles syntax; this checks the values a node cannot run with.
//! All violations are collected rather than stopping at the first one.

use std::net::SocketAddr;

use crate::config::schema::RelayNodeConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("relay.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("directory contains an empty node id")]
    EmptyNodeId,

    #[error("directory entry '{node}' must be host:port, got '{address}'")]
    NodeAddress { node: String, address: String },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayNodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.relay.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_timeout_secs"));
    }
    if config.relay.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_timeout_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    for (node, address) in &config.directory.nodes {
        if node.trim().is_empty() {
            errors.push(ValidationError::EmptyNodeId);
            continue;
        }
        if !is_authority(address) {
            errors.push(ValidationError::NodeAddress {
                node: node.clone(),
                address: address.clone(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// Directory addresses are spliced into "scheme://{address}{path}", so they
// must be a bare authority.
fn is_authority(address: &str) -> bool {
    if address.is_empty() || address.contains("://") || address.contains('/') {
        return false;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
