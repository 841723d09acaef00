//! The single entry point for callers.
//!
//! A [`GraphClient`] runs every query either against an in-process graph or
//! against a sharded cluster; the operations and their results are the same
//! in both modes.

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::graph::InMemoryGraph;
use crate::node::{Context, Feature, NodeId, WalkerInfo};
use crate::ops::{DistOps, LocalOps};
use crate::rpc::{HttpTransport, Transport};
use std::sync::Arc;
use tracing::info;

enum Backend {
    Local(LocalOps),
    Dist(DistOps),
}

pub struct GraphClient {
    backend: Backend,
}

impl GraphClient {
    /// Loads the whole graph named by `config` into this process.
    pub fn local(config: &GraphConfig) -> Result<Self> {
        let ops = LocalOps::from_config(config)?;
        info!("local graph client ready");
        Ok(GraphClient {
            backend: Backend::Local(ops),
        })
    }

    /// Local client over an already built graph.
    pub fn from_graph(graph: Arc<InMemoryGraph>, config: &GraphConfig) -> Result<Self> {
        Ok(GraphClient {
            backend: Backend::Local(LocalOps::new(graph, config)?),
        })
    }

    /// Connects over HTTP to the shards listed in `config.ip_ports`.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let addrs = config.shard_addrs();
        if addrs.len() != config.shard_num {
            return Err(Error::config(format!(
                "ip_ports lists {} shards, shard_num is {}",
                addrs.len(),
                config.shard_num
            )));
        }
        let transport = HttpTransport::new(&addrs)?;
        Self::with_transport(Arc::new(transport), config).await
    }

    /// Distributed client over any transport.
    pub async fn with_transport(transport: Arc<dyn Transport>, config: &GraphConfig) -> Result<Self> {
        let ops = DistOps::connect(transport, config).await?;
        Ok(GraphClient {
            backend: Backend::Dist(ops),
        })
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self.backend, Backend::Dist(_))
    }

    /// Number of namespaces of the graph (cluster-wide in distributed mode).
    pub fn ns_size(&self) -> usize {
        match &self.backend {
            Backend::Local(ops) => ops.ns_size(),
            Backend::Dist(ops) => ops.ns_size(),
        }
    }

    /// `count` nodes per namespace touched by `nodes`, shared by every query
    /// node of that namespace. Indexed by namespace id.
    pub async fn shared_sample_negative(
        &self,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        match &self.backend {
            Backend::Local(ops) => ops.shared_sample_negative(count, nodes, excluded),
            Backend::Dist(ops) => ops.shared_sample_negative(count, nodes, excluded).await,
        }
    }

    /// `count` nodes per query node, parallel to `nodes`.
    pub async fn indep_sample_negative(
        &self,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        match &self.backend {
            Backend::Local(ops) => ops.indep_sample_negative(count, nodes, excluded),
            Backend::Dist(ops) => ops.indep_sample_negative(count, nodes, excluded).await,
        }
    }

    /// `count` neighbors per node; a negative count returns every neighbor.
    pub async fn sample_neighbor(&self, count: i32, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>> {
        match &self.backend {
            Backend::Local(ops) => ops.sample_neighbor(count, nodes),
            Backend::Dist(ops) => ops.sample_neighbor(count, nodes).await,
        }
    }

    /// Random walks. Each path starts with its start node and holds at most
    /// `walk_lens[i]` nodes; a start node without neighbors is an error.
    pub async fn static_traverse(
        &self,
        cur_nodes: &[NodeId],
        walk_lens: &[usize],
        info: &WalkerInfo,
    ) -> Result<Vec<Vec<NodeId>>> {
        match &self.backend {
            Backend::Local(ops) => local_traverse(ops, cur_nodes, walk_lens, info),
            Backend::Dist(ops) => ops.static_traverse(cur_nodes, walk_lens, info).await,
        }
    }

    pub async fn lookup_feature(&self, nodes: &[NodeId]) -> Result<(Vec<Feature>, Vec<Feature>)> {
        match &self.backend {
            Backend::Local(ops) => Ok(ops.lookup_feature(nodes)),
            Backend::Dist(ops) => ops.lookup_feature(nodes).await,
        }
    }

    pub async fn lookup_node_feature(&self, nodes: &[NodeId]) -> Result<Vec<Feature>> {
        match &self.backend {
            Backend::Local(ops) => Ok(ops.lookup_node_feature(nodes)),
            Backend::Dist(ops) => ops.lookup_node_feature(nodes).await,
        }
    }

    pub async fn lookup_neighbor_feature(&self, nodes: &[NodeId]) -> Result<Vec<Feature>> {
        match &self.backend {
            Backend::Local(ops) => Ok(ops.lookup_neighbor_feature(nodes)),
            Backend::Dist(ops) => ops.lookup_neighbor_feature(nodes).await,
        }
    }

    pub async fn lookup_context(&self, nodes: &[NodeId]) -> Result<Vec<Context>> {
        match &self.backend {
            Backend::Local(ops) => ops.lookup_context(nodes),
            Backend::Dist(ops) => ops.lookup_context(nodes).await,
        }
    }

    /// Meta value per shard; a local client answers as a single shard.
    pub async fn lookup_meta(&self, key: &str) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Local(ops) => Ok(vec![ops.meta_lookup(key)?]),
            Backend::Dist(ops) => ops.meta_lookup(key).await,
        }
    }
}

fn local_traverse(
    ops: &LocalOps,
    cur_nodes: &[NodeId],
    walk_lens: &[usize],
    info: &WalkerInfo,
) -> Result<Vec<Vec<NodeId>>> {
    let hops: Vec<usize> = walk_lens.iter().map(|&len| len.saturating_sub(1)).collect();
    let tails = ops.traverse(cur_nodes, &hops, &[], info)?;
    cur_nodes
        .iter()
        .zip(hops)
        .zip(tails)
        .map(|((&start, wanted), tail)| {
            if wanted > 0 && tail.is_empty() {
                return Err(Error::data(format!("isolated start node {}", start)));
            }
            let mut path = Vec::with_capacity(tail.len() + 1);
            path.push(start);
            path.extend(tail);
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NamespaceTable;

    fn ring_client() -> GraphClient {
        let mut builder = InMemoryGraph::builder(NamespaceTable::single());
        for i in 0..6u64 {
            builder.add_context(i, vec![((i + 1) % 6, 1.0), ((i + 5) % 6, 1.0)]);
        }
        builder.add_context(10, vec![(11, 1.0)]);
        GraphClient::from_graph(Arc::new(builder.build().unwrap()), &GraphConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_local_traverse_includes_start() {
        let client = ring_client();
        assert!(!client.is_distributed());
        let paths = client
            .static_traverse(&[0, 3, 4], &[5, 1, 0], &WalkerInfo::default())
            .await
            .unwrap();
        assert_eq!(paths[0].len(), 5);
        assert_eq!(paths[0][0], 0);
        for pair in paths[0].windows(2) {
            let diff = (pair[1] + 6 - pair[0]) % 6;
            assert!(diff == 1 || diff == 5);
        }
        assert_eq!(paths[1], vec![3]);
        assert_eq!(paths[2], vec![4]);
    }

    #[tokio::test]
    async fn test_local_traverse_isolated_start() {
        let client = ring_client();
        let err = client
            .static_traverse(&[0, 11], &[3, 3], &WalkerInfo::default())
            .await;
        assert!(matches!(err, Err(Error::Data(_))));
    }

    #[tokio::test]
    async fn test_local_meta_lookup() {
        let client = ring_client();
        let values = client.lookup_meta(crate::rpc::META_MAX_NODE_PER_RPC).await.unwrap();
        assert_eq!(values, vec!["2000".to_string()]);
    }
}
