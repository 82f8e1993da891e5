//! Relay failure taxonomy.

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// A relay failure scoped to one request or connection.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The directory has no address for the node.
    #[error("node '{0}' is not known")]
    NodeUnknown(String),

    /// The target URL could not be assembled from address and path.
    #[error("invalid relay target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Transport failure talking to a resolved address.
    #[error("request to {address} failed: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The remote node did not answer in time.
    #[error("request to {address} timed out after {after:?}")]
    Timeout { address: String, after: Duration },

    /// WebSocket dial to the remote node failed.
    #[error("dial {target} failed: {reason}")]
    Dial { target: String, reason: String },
}

impl RelayError {
    /// Plain-text body returned to the original caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            RelayError::NodeUnknown(_) => "Server Error: Node not known",
            RelayError::InvalidTarget { .. } => "Server Error: Could not connect to target",
            RelayError::Unreachable { .. } | RelayError::Dial { .. } => {
                "Server Error: Request to target failed"
            }
            RelayError::Timeout { .. } => "Server Error: Request to target timed out",
        }
    }

    /// Short label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::NodeUnknown(_) => "node_unknown",
            RelayError::InvalidTarget { .. } => "invalid_target",
            RelayError::Unreachable { .. } => "unreachable",
            RelayError::Timeout { .. } => "timeout",
            RelayError::Dial { .. } => "dial_failed",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.public_message(),
        )
            .into_response()
    }
}
