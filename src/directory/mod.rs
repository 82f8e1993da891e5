//! Node directory: maps an opaque node identifier to a network address.
//!
//! The directory itself (service discovery) lives outside this crate. The
//! relay only consumes the [`NodeAddressResolver`] capability, injected at
//! construction. [`StaticDirectory`] is a config-backed table used by the
//! binary and by tests.

mod static_table;

pub use static_table::StaticDirectory;

use async_trait::async_trait;

/// Looks up the address ("host:port") of a node.
///
/// Implementations must be safe to call concurrently from many relay
/// operations.
#[async_trait]
pub trait NodeAddressResolver: Send + Sync {
    /// Resolve `node_id` to an address. `None` means the node is unknown.
    async fn resolve_node(&self, node_id: &str) -> Option<String>;
}
