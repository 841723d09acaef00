use crate::error::{Error, Result};
use crate::graph::{InMemoryGraph, NamespaceTable};
use crate::node::{namespace_of, NodeId, NsId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::error;

/// Read-only view of the data a sampler builder draws from.
///
/// `nodes_list()[ns]` and `freqs_list()[ns]` are parallel arrays. Contexts
/// returned by `find_context` hold each neighbor at most once, sorted by id.
pub trait SamplerSource: Send + Sync {
    fn namespaces(&self) -> &NamespaceTable;

    fn ns_size(&self) -> usize {
        self.nodes_list().len()
    }

    fn nodes_list(&self) -> &[Vec<NodeId>];

    fn freqs_list(&self) -> &[Vec<f32>];

    /// Nodes that own a context.
    fn node_keys(&self) -> Result<&[NodeId]>;

    fn find_context(&self, node: NodeId) -> Option<&[(NodeId, f32)]>;
}

/// Source over an [`InMemoryGraph`].
pub struct GraphSamplerSource {
    graph: Arc<InMemoryGraph>,
}

impl GraphSamplerSource {
    pub fn new(graph: Arc<InMemoryGraph>) -> Self {
        GraphSamplerSource { graph }
    }

    pub fn graph(&self) -> &Arc<InMemoryGraph> {
        &self.graph
    }
}

impl SamplerSource for GraphSamplerSource {
    fn namespaces(&self) -> &NamespaceTable {
        self.graph.namespaces()
    }

    fn nodes_list(&self) -> &[Vec<NodeId>] {
        self.graph.uniq_nodes_list()
    }

    fn freqs_list(&self) -> &[Vec<f32>] {
        self.graph.freqs_list()
    }

    fn node_keys(&self) -> Result<&[NodeId]> {
        Ok(self.graph.keys())
    }

    fn find_context(&self, node: NodeId) -> Option<&[(NodeId, f32)]> {
        self.graph.find_context(node)
    }
}

/// Flat per-namespace frequency table with no adjacency.
#[derive(Debug, Clone)]
pub struct FreqTable {
    namespaces: NamespaceTable,
    nodes_list: Vec<Vec<NodeId>>,
    freqs_list: Vec<Vec<f32>>,
}

impl FreqTable {
    pub fn new(
        namespaces: NamespaceTable,
        nodes_list: Vec<Vec<NodeId>>,
        freqs_list: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if nodes_list.len() != namespaces.ns_size() || freqs_list.len() != nodes_list.len() {
            return Err(Error::data(format!(
                "freq table needs {} namespace slots, got {} node lists and {} freq lists",
                namespaces.ns_size(),
                nodes_list.len(),
                freqs_list.len()
            )));
        }
        for (ns, (nodes, freqs)) in nodes_list.iter().zip(&freqs_list).enumerate() {
            if nodes.len() != freqs.len() {
                return Err(Error::data(format!(
                    "namespace {} has {} nodes but {} frequencies",
                    ns,
                    nodes.len(),
                    freqs.len()
                )));
            }
            let mut seen = HashSet::with_capacity(nodes.len());
            for &node in nodes {
                if namespace_of(node) as usize != ns {
                    return Err(Error::data(format!(
                        "node {} listed under namespace {}",
                        node, ns
                    )));
                }
                if !seen.insert(node) {
                    return Err(Error::data(format!("duplicate node {} in freq table", node)));
                }
            }
        }
        Ok(FreqTable {
            namespaces,
            nodes_list,
            freqs_list,
        })
    }

    /// Groups `(node, freq)` pairs by namespace, summing repeated nodes.
    pub fn from_counts(
        namespaces: NamespaceTable,
        counts: impl IntoIterator<Item = (NodeId, f32)>,
    ) -> Result<Self> {
        let ns_size = namespaces.ns_size();
        let mut grouped: Vec<std::collections::BTreeMap<NodeId, f32>> =
            vec![Default::default(); ns_size];
        for (node, freq) in counts {
            let ns: NsId = namespace_of(node);
            if !namespaces.contains(ns) {
                return Err(Error::data(format!(
                    "node {} has unconfigured namespace {}",
                    node, ns
                )));
            }
            *grouped[ns as usize].entry(node).or_default() += freq;
        }
        let nodes_list = grouped.iter().map(|m| m.keys().copied().collect()).collect();
        let freqs_list = grouped.iter().map(|m| m.values().copied().collect()).collect();
        Self::new(namespaces, nodes_list, freqs_list)
    }
}

/// Source over a [`FreqTable`]. Usable for negative sampling only.
pub struct DeepSamplerSource {
    table: FreqTable,
}

impl DeepSamplerSource {
    pub fn new(table: FreqTable) -> Self {
        DeepSamplerSource { table }
    }
}

impl SamplerSource for DeepSamplerSource {
    fn namespaces(&self) -> &NamespaceTable {
        &self.table.namespaces
    }

    fn nodes_list(&self) -> &[Vec<NodeId>] {
        &self.table.nodes_list
    }

    fn freqs_list(&self) -> &[Vec<f32>] {
        &self.table.freqs_list
    }

    fn node_keys(&self) -> Result<&[NodeId]> {
        Err(Error::data("a frequency table has no node keys"))
    }

    fn find_context(&self, node: NodeId) -> Option<&[(NodeId, f32)]> {
        error!("a frequency table has no context, asked for node {}", node);
        None
    }
}
