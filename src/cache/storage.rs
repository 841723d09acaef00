use crate::node::{Context, Feature, NodeId};
use std::collections::HashMap;

/// Client-side prefetch of hot nodes. Filled once when a distributed
/// client connects, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    contexts: HashMap<NodeId, Context>,
    node_feats: HashMap<NodeId, Feature>,
    neigh_feats: HashMap<NodeId, Feature>,
}

impl CacheStorage {
    pub fn find_context(&self, node: NodeId) -> Option<&Context> {
        self.contexts.get(&node)
    }

    pub fn find_node_feature(&self, node: NodeId) -> Option<&Feature> {
        self.node_feats.get(&node)
    }

    pub fn find_neighbor_feature(&self, node: NodeId) -> Option<&Feature> {
        self.neigh_feats.get(&node)
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.node_feats.len().max(self.contexts.len())
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty() && self.node_feats.is_empty() && self.neigh_feats.is_empty()
    }

    /// Empty contexts are not kept, so such nodes keep going to their shard.
    pub(crate) fn insert(&mut self, node: NodeId, context: Context, node_feat: Feature, neigh_feat: Feature) {
        if !context.is_empty() {
            self.contexts.insert(node, context);
        }
        self.node_feats.insert(node, node_feat);
        self.neigh_feats.insert(node, neigh_feat);
    }
}
