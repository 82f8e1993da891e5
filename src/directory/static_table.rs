use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::NodeAddressResolver;

/// In-memory node table, refreshed wholesale on config reload.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    nodes: DashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: &BTreeMap<String, String>) -> Self {
        let directory = Self::new();
        directory.replace(nodes);
        directory
    }

    /// Add or update one entry.
    pub fn insert(&self, node_id: impl Into<String>, address: impl Into<String>) {
        self.nodes.insert(node_id.into(), address.into());
    }

    /// Replace the table contents with `nodes`.
    pub fn replace(&self, nodes: &BTreeMap<String, String>) {
        self.nodes.retain(|id, _| nodes.contains_key(id));
        for (id, address) in nodes {
            self.nodes.insert(id.clone(), address.clone());
        }
        tracing::debug!(nodes = self.nodes.len(), "Node directory updated");
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[async_trait]
impl NodeAddressResolver for StaticDirectory {
    async fn resolve_node(&self, node_id: &str) -> Option<String> {
        self.nodes
            .get(node_id)
            .map(|entry| entry.value().clone())
            .filter(|address| !address.is_empty())
    }
}
