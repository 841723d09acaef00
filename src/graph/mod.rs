//! The in-memory adjacency store the samplers read from.
//!
//! Graph loading is plain whitespace-separated text, one node
//! per line, all held in hash maps for the life of the process.

mod loader;
mod namespace;

pub use loader::parse_line;
pub use namespace::{NamespaceTable, EMPTY_CONFIG_NAME};

use crate::error::{Error, Result};
use crate::node::{namespace_of, Context, Feature, NodeId};
use std::collections::HashMap;
use tracing::info;

/// Read-only adjacency lists, features and per-namespace node statistics.
#[derive(Debug, Clone)]
pub struct InMemoryGraph {
    namespaces: NamespaceTable,
    /// Nodes with a context, ascending.
    keys: Vec<NodeId>,
    contexts: HashMap<NodeId, Context>,
    in_degrees: HashMap<NodeId, u32>,
    node_features: HashMap<NodeId, Feature>,
    neighbor_features: HashMap<NodeId, Feature>,
    /// Per namespace: every node seen as a key or a neighbor, ascending.
    uniq_nodes: Vec<Vec<NodeId>>,
    /// Parallel to `uniq_nodes`: occurrence counts.
    freqs: Vec<Vec<f32>>,
    total_freqs: Vec<f64>,
}

impl InMemoryGraph {
    pub fn builder(namespaces: NamespaceTable) -> GraphBuilder {
        GraphBuilder {
            namespaces,
            contexts: HashMap::new(),
            node_features: HashMap::new(),
            neighbor_features: HashMap::new(),
        }
    }

    pub fn find_context(&self, node: NodeId) -> Option<&[(NodeId, f32)]> {
        self.contexts.get(&node).map(Vec::as_slice)
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.contexts.get(&node).map_or(0, Vec::len)
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.in_degrees.get(&node).copied().unwrap_or(0) as usize
    }

    pub fn keys(&self) -> &[NodeId] {
        &self.keys
    }

    pub fn node_feature(&self, node: NodeId) -> Option<&Feature> {
        self.node_features.get(&node)
    }

    pub fn neighbor_feature(&self, node: NodeId) -> Option<&Feature> {
        self.neighbor_features.get(&node)
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn ns_size(&self) -> usize {
        self.uniq_nodes.len()
    }

    pub fn uniq_nodes_list(&self) -> &[Vec<NodeId>] {
        &self.uniq_nodes
    }

    pub fn freqs_list(&self) -> &[Vec<f32>] {
        &self.freqs
    }

    /// Sum of node frequencies per namespace.
    pub fn total_freqs(&self) -> &[f64] {
        &self.total_freqs
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Collects contexts and features, then freezes them into an [`InMemoryGraph`].
pub struct GraphBuilder {
    namespaces: NamespaceTable,
    contexts: HashMap<NodeId, Context>,
    node_features: HashMap<NodeId, Feature>,
    neighbor_features: HashMap<NodeId, Feature>,
}

impl GraphBuilder {
    /// Appends `context` to whatever `node` already has.
    pub fn add_context(&mut self, node: NodeId, context: Context) -> &mut Self {
        self.contexts.entry(node).or_default().extend(context);
        self
    }

    pub fn add_node_feature(&mut self, node: NodeId, feature: Feature) -> &mut Self {
        self.node_features.insert(node, feature);
        self
    }

    pub fn add_neighbor_feature(&mut self, node: NodeId, feature: Feature) -> &mut Self {
        self.neighbor_features.insert(node, feature);
        self
    }

    pub fn build(self) -> Result<InMemoryGraph> {
        let GraphBuilder {
            namespaces,
            mut contexts,
            node_features,
            neighbor_features,
        } = self;
        let ns_size = namespaces.ns_size();

        // Step 1: every node must belong to a configured namespace.
        for (&node, context) in &contexts {
            for n in std::iter::once(node).chain(context.iter().map(|p| p.0)) {
                if !namespaces.contains(namespace_of(n)) {
                    return Err(Error::data(format!(
                        "node {} has namespace {} which is not configured",
                        n,
                        namespace_of(n)
                    )));
                }
            }
        }

        // Step 2: sort contexts and fold repeated neighbors into one entry.
        // The namespace lives in the high bits, so ordering by raw id groups
        // neighbors by namespace too.
        for context in contexts.values_mut() {
            context.sort_by_key(|p| p.0);
            context.dedup_by(|next, kept| {
                if next.0 == kept.0 {
                    kept.1 += next.1;
                    true
                } else {
                    false
                }
            });
        }
        let mut keys: Vec<NodeId> = contexts.keys().copied().collect();
        keys.sort_unstable();

        // Step 3: degree and frequency statistics.
        let mut in_degrees: HashMap<NodeId, u32> = HashMap::new();
        let mut occurrences: Vec<HashMap<NodeId, u64>> = vec![HashMap::new(); ns_size];
        for &key in &keys {
            *occurrences[namespace_of(key) as usize].entry(key).or_default() += 1;
            for &(neighbor, _) in &contexts[&key] {
                *in_degrees.entry(neighbor).or_default() += 1;
                *occurrences[namespace_of(neighbor) as usize]
                    .entry(neighbor)
                    .or_default() += 1;
            }
        }

        let mut uniq_nodes = Vec::with_capacity(ns_size);
        let mut freqs = Vec::with_capacity(ns_size);
        let mut total_freqs = Vec::with_capacity(ns_size);
        for counts in occurrences {
            let mut pairs: Vec<(NodeId, u64)> = counts.into_iter().collect();
            pairs.sort_unstable_by_key(|p| p.0);
            total_freqs.push(pairs.iter().map(|p| p.1 as f64).sum());
            freqs.push(pairs.iter().map(|p| p.1 as f32).collect());
            uniq_nodes.push(pairs.into_iter().map(|p| p.0).collect());
        }

        info!(
            "graph built: {} keys, {} namespaces, {} node features, {} neighbor features",
            keys.len(),
            ns_size,
            node_features.len(),
            neighbor_features.len()
        );

        Ok(InMemoryGraph {
            namespaces,
            keys,
            contexts,
            in_degrees,
            node_features,
            neighbor_features,
            uniq_nodes,
            freqs,
            total_freqs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::make_node;

    fn two_namespaces() -> NamespaceTable {
        NamespaceTable::from_pairs([("user", 0), ("item", 1)]).unwrap()
    }

    #[test]
    fn test_contexts_sorted_by_namespace() {
        let item = make_node(1, 5);
        let mut builder = InMemoryGraph::builder(two_namespaces());
        builder.add_context(1, vec![(item, 1.0), (3, 2.0), (2, 1.0)]);
        let graph = builder.build().unwrap();
        let context = graph.find_context(1).unwrap();
        assert_eq!(context.iter().map(|p| p.0).collect::<Vec<_>>(), vec![2, 3, item]);
        assert_eq!(graph.out_degree(1), 3);
        assert_eq!(graph.in_degree(item), 1);
        assert!(graph.find_context(2).is_none());
    }

    #[test]
    fn test_repeated_neighbors_merged() {
        let mut builder = InMemoryGraph::builder(NamespaceTable::single());
        builder
            .add_context(0, vec![(1, 1.0), (2, 1.0)])
            .add_context(0, vec![(1, 0.5)]);
        let graph = builder.build().unwrap();
        assert_eq!(graph.find_context(0).unwrap(), &[(1, 1.5), (2, 1.0)]);
    }

    #[test]
    fn test_frequency_statistics() {
        let item = make_node(1, 9);
        let mut builder = InMemoryGraph::builder(two_namespaces());
        builder
            .add_context(1, vec![(2, 1.0), (item, 1.0)])
            .add_context(2, vec![(1, 1.0), (item, 0.5)]);
        let graph = builder.build().unwrap();

        assert_eq!(graph.ns_size(), 2);
        assert_eq!(graph.uniq_nodes_list()[0], vec![1, 2]);
        assert_eq!(graph.freqs_list()[0], vec![2.0, 2.0]);
        assert_eq!(graph.uniq_nodes_list()[1], vec![item]);
        assert_eq!(graph.freqs_list()[1], vec![2.0]);
        assert_eq!(graph.total_freqs(), &[4.0, 2.0]);
    }

    #[test]
    fn test_unknown_namespace_rejected() {
        let mut builder = InMemoryGraph::builder(two_namespaces());
        builder.add_context(1, vec![(make_node(7, 1), 1.0)]);
        assert!(matches!(builder.build(), Err(Error::Data(_))));
    }
}
