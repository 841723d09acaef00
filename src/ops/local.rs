//! Ops answered against the local partition only. A graph server exposes
//! exactly these; a local client calls them directly.

use crate::cache::select_cache_nodes;
use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::graph::InMemoryGraph;
use crate::node::{empty_feature, Context, Feature, NodeId, WalkerInfo};
use crate::rpc::{META_MAX_NODE_PER_RPC, META_NODE_FREQ};
use crate::sampler::{
    GraphSamplerSource, NegativeMode, NegativeSampler, NegativeSamplerBuilder, NeighborSampler,
    NeighborSamplerBuilder, RandomWalker, SamplerSource,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Every sampler and lookup of one partition, built once up front.
pub struct LocalOps {
    graph: Arc<InMemoryGraph>,
    negative: NegativeSampler,
    neighbor: NeighborSampler,
    walker: RandomWalker,
    cache_nodes: Vec<NodeId>,
    max_node_per_rpc: usize,
}

impl LocalOps {
    /// Loads this shard's partition and builds every op over it.
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        config.validate()?;
        let graph = Arc::new(InMemoryGraph::load(config)?);
        Self::new(graph, config)
    }

    /// # Arguments
    ///
    /// * `graph` - The local partition.
    /// * `config` - Sampler kinds, meta-path switch, cache strategy and page size.
    ///
    /// # Returns
    ///
    /// * `Result<LocalOps>` - Fails if any builder fails; no partial set of ops is returned.
    pub fn new(graph: Arc<InMemoryGraph>, config: &GraphConfig) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();
        let threads = config.worker_threads();
        let source: Arc<dyn SamplerSource> = Arc::new(GraphSamplerSource::new(graph.clone()));

        let negative_builder = Arc::new(NegativeSamplerBuilder::new(
            source.clone(),
            config.negative_sampler,
        )?);
        let neighbor_builder = Arc::new(NeighborSamplerBuilder::new(
            source,
            config.neighbor_sampler,
            threads,
        )?);
        let walker = if config.enable_meta_path {
            RandomWalker::with_meta_path(neighbor_builder.clone())?
        } else {
            RandomWalker::new(neighbor_builder.clone())
        };
        let cache_nodes = select_cache_nodes(&graph, config.cache_type, config.cache_thld, threads)?;

        info!(
            "local ops ready in {:?}: negative={}, neighbor={}, meta_path={}, cache nodes={}",
            start.elapsed(),
            config.negative_sampler.name(),
            config.neighbor_sampler.name(),
            config.enable_meta_path,
            cache_nodes.len()
        );

        Ok(LocalOps {
            graph,
            negative: NegativeSampler::new(negative_builder),
            neighbor: NeighborSampler::new(neighbor_builder),
            walker,
            cache_nodes,
            max_node_per_rpc: config.max_node_per_rpc,
        })
    }

    pub fn graph(&self) -> &Arc<InMemoryGraph> {
        &self.graph
    }

    pub fn ns_size(&self) -> usize {
        self.graph.ns_size()
    }

    pub fn meta_lookup(&self, key: &str) -> Result<String> {
        match key {
            META_NODE_FREQ => Ok(self
                .graph
                .total_freqs()
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")),
            META_MAX_NODE_PER_RPC => Ok(self.max_node_per_rpc.to_string()),
            other => Err(Error::data(format!("unknown meta key: {}", other))),
        }
    }

    /// `count` samples per namespace touched by `nodes`, indexed by namespace.
    pub fn shared_sample_negative(
        &self,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        self.negative.sample(NegativeMode::Shared, count, nodes, excluded)
    }

    /// `count` samples per query node.
    pub fn indep_sample_negative(
        &self,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        self.negative.sample(NegativeMode::Independent, count, nodes, excluded)
    }

    pub fn sample_neighbor(&self, count: i32, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>> {
        self.neighbor.sample(count, nodes)
    }

    /// Hops after each start node, up to `walk_lens[i]` of them.
    pub fn traverse(
        &self,
        cur_nodes: &[NodeId],
        walk_lens: &[usize],
        offsets: &[usize],
        info: &WalkerInfo,
    ) -> Result<Vec<Vec<NodeId>>> {
        self.walker
            .traverse_with(&mut rand::rng(), cur_nodes, walk_lens, offsets, info)
    }

    /// Node and neighbor features. Absent features come back as the
    /// single-pair sentinel.
    pub fn lookup_feature(&self, nodes: &[NodeId]) -> (Vec<Feature>, Vec<Feature>) {
        (self.lookup_node_feature(nodes), self.lookup_neighbor_feature(nodes))
    }

    pub fn lookup_node_feature(&self, nodes: &[NodeId]) -> Vec<Feature> {
        nodes
            .iter()
            .map(|&node| {
                self.graph.node_feature(node).cloned().unwrap_or_else(|| {
                    if self.graph.find_context(node).is_none() {
                        error!("node {} is not in this graph", node);
                    }
                    empty_feature()
                })
            })
            .collect()
    }

    pub fn lookup_neighbor_feature(&self, nodes: &[NodeId]) -> Vec<Feature> {
        nodes
            .iter()
            .map(|&node| {
                self.graph
                    .neighbor_feature(node)
                    .cloned()
                    .unwrap_or_else(empty_feature)
            })
            .collect()
    }

    /// A missing node yields an empty context; the call fails only when
    /// every node is missing.
    pub fn lookup_context(&self, nodes: &[NodeId]) -> Result<Vec<Context>> {
        let contexts = self.lookup_context_partial(nodes);
        ensure_any_context(&contexts)?;
        Ok(contexts)
    }

    /// Context lookup for one shard's slice of a batch; never fails.
    pub fn lookup_context_partial(&self, nodes: &[NodeId]) -> Vec<Context> {
        nodes
            .iter()
            .map(|&node| match self.graph.find_context(node) {
                Some(context) => context.to_vec(),
                None => {
                    warn!("node {} has no context", node);
                    Vec::new()
                }
            })
            .collect()
    }

    pub fn sample_neighbor_partial(&self, count: i32, nodes: &[NodeId]) -> Vec<Vec<NodeId>> {
        self.neighbor.sample_partial(&mut rand::rng(), count, nodes)
    }

    /// Page of the selected cache nodes starting at `cursor`.
    pub fn cache_node_lookup(&self, cursor: usize, count: usize) -> Result<Vec<NodeId>> {
        if cursor > self.cache_nodes.len() {
            return Err(Error::data(format!(
                "cursor {} is past the {} cache nodes",
                cursor,
                self.cache_nodes.len()
            )));
        }
        let end = cursor.saturating_add(count).min(self.cache_nodes.len());
        Ok(self.cache_nodes[cursor..end].to_vec())
    }
}

/// Fails when a non-empty batch found no context at all.
pub fn ensure_any_context(contexts: &[Context]) -> Result<()> {
    if !contexts.is_empty() && contexts.iter().all(Vec::is_empty) {
        return Err(Error::data(format!(
            "none of the {} nodes has a context",
            contexts.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheKind, SamplingKind};
    use crate::graph::NamespaceTable;
    use crate::node::is_empty_feature;

    fn build_ops(config: &GraphConfig) -> LocalOps {
        let mut builder = InMemoryGraph::builder(NamespaceTable::single());
        for i in 0..10u64 {
            builder.add_context(i, vec![((i + 1) % 10, 1.0), ((i + 2) % 10, 2.0)]);
        }
        builder.add_node_feature(3, vec![(7, 0.5)]);
        builder.add_neighbor_feature(3, vec![(8, 1.5)]);
        LocalOps::new(Arc::new(builder.build().unwrap()), config).unwrap()
    }

    #[test]
    fn test_meta_lookup() {
        let ops = build_ops(&GraphConfig::default());
        assert_eq!(ops.meta_lookup(META_NODE_FREQ).unwrap(), "30");
        assert_eq!(ops.meta_lookup(META_MAX_NODE_PER_RPC).unwrap(), "2000");
        assert!(ops.meta_lookup("nope").is_err());
    }

    #[test]
    fn test_feature_sentinel() {
        let ops = build_ops(&GraphConfig::default());
        let (node_feats, neigh_feats) = ops.lookup_feature(&[3, 4, 99]);
        assert_eq!(node_feats[0], vec![(7, 0.5)]);
        assert_eq!(neigh_feats[0], vec![(8, 1.5)]);
        assert!(is_empty_feature(&node_feats[1]));
        assert!(is_empty_feature(&neigh_feats[2]));
    }

    #[test]
    fn test_context_lookup() {
        let ops = build_ops(&GraphConfig::default());
        let contexts = ops.lookup_context(&[99, 2]).unwrap();
        assert!(contexts[0].is_empty());
        assert_eq!(contexts[1], vec![(3, 1.0), (4, 2.0)]);
        assert!(ops.lookup_context(&[99]).is_err());
    }

    #[test]
    fn test_cache_node_pages() {
        let config = GraphConfig {
            cache_type: CacheKind::Degree,
            cache_thld: 0.5,
            ..GraphConfig::default()
        };
        let ops = build_ops(&config);
        let first = ops.cache_node_lookup(0, 3).unwrap();
        let second = ops.cache_node_lookup(3, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert!(ops.cache_node_lookup(5, 3).unwrap().is_empty());
        assert!(ops.cache_node_lookup(6, 3).is_err());
    }

    #[test]
    fn test_meta_path_walker_switch() {
        let config = GraphConfig {
            neighbor_sampler: SamplingKind::PartialSum,
            enable_meta_path: true,
            ..GraphConfig::default()
        };
        let ops = build_ops(&config);
        let info = WalkerInfo::with_meta_path(vec![0]);
        let seqs = ops.traverse(&[0], &[4], &[], &info).unwrap();
        assert_eq!(seqs[0].len(), 4);

        let plain = build_ops(&GraphConfig::default());
        assert!(plain.traverse(&[0], &[4], &[], &info).is_err());
    }
}
