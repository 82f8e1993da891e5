//! Relay target resolution.
//!
//! # Responsibilities
//! - Extract the target node id from the `nodeId` query parameter or the
//!   `X-Node-Id` header (query wins)
//! - Neutralize identifiers and addresses that point back at this node
//! - Resolve remote ids through the injected directory
//!
//! # Design Decisions
//! - No caching or retry: every request resolves afresh
//! - An unknown node is its own outcome so callers can report it apart from
//!   transport failures

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{HeaderMap, HeaderName, Uri};
use url::form_urlencoded;

use crate::config::RelayNodeConfig;
use crate::directory::NodeAddressResolver;

/// Header carrying the target node id.
pub const NODE_ID_HEADER: HeaderName = HeaderName::from_static("x-node-id");

/// Query parameter carrying the target node id.
pub const NODE_ID_QUERY: &str = "nodeId";

/// Where one inbound request or connection should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTarget {
    /// Serve locally: no id, or an id/address that is this node.
    Local,
    /// Forward to `address`.
    Remote { node_id: String, address: String },
    /// The directory has no entry for `node_id`.
    Unknown { node_id: String },
}

impl RelayTarget {
    pub fn is_local(&self) -> bool {
        matches!(self, RelayTarget::Local)
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            RelayTarget::Local => None,
            RelayTarget::Remote { node_id, .. } | RelayTarget::Unknown { node_id } => Some(node_id),
        }
    }
}

/// The names under which this node can address itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    port: u16,
    aliases: HashSet<String>,
}

impl LocalIdentity {
    /// Loopback aliases for `port`: `localhost`, `127.0.0.1` and `[::1]`.
    pub fn new(port: u16) -> Self {
        let aliases = [
            format!("localhost:{port}"),
            format!("127.0.0.1:{port}"),
            format!("[::1]:{port}"),
        ]
        .into_iter()
        .collect();
        Self { port, aliases }
    }

    /// Identity for a node listening on `bound`.
    ///
    /// A concrete bind address is an alias as is. A wildcard bind stands for
    /// every interface, so each interface address is added on `bound`'s
    /// port. `extra` holds configured names such as `relay.local_aliases`.
    pub fn for_listener(bound: SocketAddr, extra: &[String]) -> Self {
        let mut identity = Self::new(bound.port());
        if bound.ip().is_unspecified() {
            for ip in interface_ips() {
                identity = identity.with_ip(ip);
            }
        } else {
            identity = identity.with_ip(bound.ip());
        }
        for alias in extra {
            identity = identity.with_alias(alias.clone());
        }
        identity
    }

    /// Identity from the configured bind address, before the listener is
    /// bound. An unparsable address leaves only the configured aliases.
    pub fn from_config(config: &RelayNodeConfig) -> Self {
        match config.listener.bind_address.parse::<SocketAddr>() {
            Ok(bound) => Self::for_listener(bound, &config.relay.local_aliases),
            Err(_) => config
                .relay
                .local_aliases
                .iter()
                .fold(Self::new(0), |identity, alias| identity.with_alias(alias.clone())),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into().to_ascii_lowercase());
        self
    }

    /// Add `ip:port` for a local interface address.
    pub fn with_ip(self, ip: IpAddr) -> Self {
        let port = self.port;
        self.with_alias(SocketAddr::new(ip, port).to_string())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True if `id_or_address` names this node.
    pub fn is_local(&self, id_or_address: &str) -> bool {
        self.aliases.contains(&id_or_address.to_ascii_lowercase())
    }
}

fn interface_ips() -> Vec<IpAddr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces.iter().map(|iface| iface.ip()).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list network interfaces, only loopback aliases apply");
            Vec::new()
        }
    }
}

/// Pull the node id out of a request. Empty values count as absent.
pub fn extract_node_id(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let from_query = uri.query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == NODE_ID_QUERY)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    });

    from_query.or_else(|| {
        headers
            .get(&NODE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    })
}

/// Classifies requests as local or remote.
///
/// The identity can be swapped once the listener's real address is known.
pub struct RelayTargetResolver {
    directory: Arc<dyn NodeAddressResolver>,
    local: ArcSwap<LocalIdentity>,
}

impl RelayTargetResolver {
    pub fn new(directory: Arc<dyn NodeAddressResolver>, local: LocalIdentity) -> Self {
        Self {
            directory,
            local: ArcSwap::from_pointee(local),
        }
    }

    pub fn local_identity(&self) -> Arc<LocalIdentity> {
        self.local.load_full()
    }

    pub fn set_local_identity(&self, local: LocalIdentity) {
        tracing::debug!(port = local.port(), aliases = local.aliases.len(), "Local identity updated");
        self.local.store(Arc::new(local));
    }

    /// Resolve the relay target of a request.
    pub async fn resolve(&self, uri: &Uri, headers: &HeaderMap) -> RelayTarget {
        let Some(node_id) = extract_node_id(uri, headers) else {
            return RelayTarget::Local;
        };

        let local = self.local.load_full();
        if local.is_local(&node_id) {
            tracing::debug!(node_id = %node_id, port = local.port(), "Loopback node id, serving locally");
            return RelayTarget::Local;
        }

        match self.directory.resolve_node(&node_id).await {
            Some(address) if local.is_local(&address) => {
                tracing::debug!(node_id = %node_id, address = %address, "Node resolves to this node, serving locally");
                RelayTarget::Local
            }
            Some(address) => RelayTarget::Remote { node_id, address },
            None => RelayTarget::Unknown { node_id },
        }
    }
}
