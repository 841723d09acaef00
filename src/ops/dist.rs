//! Shard-routed ops.
//!
//! Every op follows the same three steps: map the batch by
//! `node % shard_count` while recording original positions, fan out one RPC
//! per non-empty shard, and write responses back into input order. Any
//! failed shard call fails the whole op.

use super::local::ensure_any_context;
use crate::cache::CacheStorage;
use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::node::{Context, Feature, NodeId, NsId, WalkerInfo};
use crate::rpc::{
    broadcast, fan_out, CacheNodeLookup, CacheNodeRequest, ContextResponse, IndepNegativeSample,
    LookupContext, LookupFeature, LookupNeighborFeature, LookupNodeFeature, MetaLookup,
    MetaLookupRequest, NegativeSampleRequest, NegativeSampleResponse, NeighborFeatureResponse,
    NeighborSampleRequest, NeighborSampleResponse, NodeFeatureResponse, NodesRequest,
    RandomNeighborSample, RandomWalkRequest, RpcCall, SharedNegativeSample, StaticRandomWalk,
    Transport, META_MAX_NODE_PER_RPC, META_NODE_FREQ,
};
use crate::sampler::ensure_any_neighbors;
use crate::sampler::negative::touched_namespaces;
use crate::sampling::{AliasSampling, Sampling};
use crate::shard::{gather, shard_of, ShardBatch};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Client side of a sharded graph.
pub struct DistOps {
    transport: Arc<dyn Transport>,
    shard_count: usize,
    timeout: Option<Duration>,
    max_node_per_rpc: usize,
    ns_size: usize,
    /// Per namespace: how that namespace's frequency mass splits across
    /// shards. `None` for namespaces no shard holds.
    shard_distribution: Vec<Option<AliasSampling>>,
    cache: CacheStorage,
}

impl DistOps {
    /// Connects to every shard behind `transport`.
    ///
    /// Fetches the page size and node frequencies from each shard, builds
    /// the per-namespace shard distribution, then fills the client cache.
    /// Any failure aborts; there is no partially initialized client.
    pub async fn connect(transport: Arc<dyn Transport>, config: &GraphConfig) -> Result<Self> {
        let shard_count = transport.shard_count();
        if shard_count == 0 {
            return Err(Error::config("shard count must be > 0"));
        }

        let mut ops = DistOps {
            transport,
            shard_count,
            timeout: config.rpc_timeout(),
            max_node_per_rpc: 0,
            ns_size: 0,
            shard_distribution: Vec::new(),
            cache: CacheStorage::default(),
        };

        // Step 1: page size, identical on every shard.
        ops.max_node_per_rpc = ops.fetch_max_node_per_rpc().await?;

        // Step 2: per-shard namespace frequencies.
        let freqs = ops.fetch_node_freqs().await?;
        ops.ns_size = freqs[0].len();
        ops.shard_distribution = build_shard_distribution(&freqs)?;

        // Step 3: prefetch hot nodes.
        ops.cache = ops.build_cache().await?;

        info!(
            "connected to {} shards: ns_size={}, max_node_per_rpc={}, cached nodes={}",
            ops.shard_count,
            ops.ns_size,
            ops.max_node_per_rpc,
            ops.cache.len()
        );
        Ok(ops)
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn ns_size(&self) -> usize {
        self.ns_size
    }

    pub fn max_node_per_rpc(&self) -> usize {
        self.max_node_per_rpc
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }

    /// The value every shard holds for `key`, in shard order.
    pub async fn meta_lookup(&self, key: &str) -> Result<Vec<String>> {
        let request = MetaLookup(MetaLookupRequest {
            key: key.to_string(),
        });
        let responses = broadcast(self.transport.as_ref(), request, self.timeout).await?;
        Ok(responses.into_iter().map(|r| r.value).collect())
    }

    async fn fetch_max_node_per_rpc(&self) -> Result<usize> {
        let values = self.meta_lookup(META_MAX_NODE_PER_RPC).await?;
        let mut agreed: Option<usize> = None;
        for (shard, value) in values.iter().enumerate() {
            let parsed: usize = value.trim().parse().map_err(|_| {
                Error::rpc(format!("shard {} sent a bad max_node_per_rpc: {}", shard, value))
            })?;
            if parsed == 0 {
                return Err(Error::config(format!("shard {} has max_node_per_rpc 0", shard)));
            }
            match agreed {
                Some(prev) if prev != parsed => {
                    return Err(Error::config(format!(
                        "shards disagree on max_node_per_rpc: {} vs {}",
                        prev, parsed
                    )))
                }
                _ => agreed = Some(parsed),
            }
        }
        agreed.ok_or_else(|| Error::rpc("no shard reported max_node_per_rpc"))
    }

    /// `[shard][namespace]` total node frequency.
    async fn fetch_node_freqs(&self) -> Result<Vec<Vec<f64>>> {
        let values = self.meta_lookup(META_NODE_FREQ).await?;
        let mut freqs = Vec::with_capacity(values.len());
        for (shard, value) in values.iter().enumerate() {
            let parsed = value
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| Error::rpc(format!("shard {} sent bad node freqs: {}", shard, value)))?;
            freqs.push(parsed);
        }
        let ns_size = freqs.first().map_or(0, Vec::len);
        if ns_size == 0 {
            return Err(Error::data("shards report no namespaces"));
        }
        if let Some(shard) = freqs.iter().position(|f| f.len() != ns_size) {
            return Err(Error::data(format!(
                "shard {} reports {} namespaces, shard 0 reports {}",
                shard,
                freqs[shard].len(),
                ns_size
            )));
        }
        Ok(freqs)
    }

    /// Samples `count` nodes once per namespace touched by `nodes`.
    ///
    /// The count is split across shards in proportion to each shard's share
    /// of the namespace, and the shards' pools are concatenated. Result is
    /// indexed by namespace and sized to the cluster's namespace count.
    pub async fn shared_sample_negative(
        &self,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        let touched = touched_namespaces(nodes, self.ns_size)?;
        let rounds = touched
            .iter()
            .map(|&(ns, representative)| self.shared_round(ns, representative, count, excluded));
        let pools = try_join_all(rounds).await?;

        let mut sampled = vec![Vec::new(); self.ns_size];
        for ((ns, _), pool) in touched.into_iter().zip(pools) {
            sampled[ns as usize] = pool;
        }
        Ok(sampled)
    }

    async fn shared_round(
        &self,
        ns: NsId,
        representative: NodeId,
        count: usize,
        excluded: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        let distribution = self
            .shard_distribution
            .get(ns as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::data(format!("no shard holds nodes of namespace {}", ns)))?;

        let split = {
            let mut rng = rand::rng();
            let mut split = vec![0usize; self.shard_count];
            for _ in 0..count {
                split[distribution.sample(&mut rng)] += 1;
            }
            split
        };
        debug!("namespace {} negative split across shards: {:?}", ns, split);

        let requests = split
            .iter()
            .map(|&share| {
                (share > 0).then(|| {
                    SharedNegativeSample(NegativeSampleRequest {
                        count: share,
                        nodes: vec![representative],
                        excluded_nodes: excluded.to_vec(),
                    })
                })
            })
            .collect();
        let responses = fan_out(self.transport.as_ref(), requests, self.timeout).await?;

        let mut pool = Vec::with_capacity(count);
        for (shard, response) in responses.into_iter().enumerate() {
            let Some(mut response) = response else {
                continue;
            };
            let remote = response
                .sampled_nodes_list
                .get_mut(ns as usize)
                .map(std::mem::take)
                .unwrap_or_default();
            if remote.len() != split[shard] {
                return Err(Error::rpc(format!(
                    "shard {} sampled {} nodes of namespace {}, {} requested",
                    shard,
                    remote.len(),
                    ns,
                    split[shard]
                )));
            }
            pool.extend(remote);
        }
        Ok(pool)
    }

    /// `count` samples per query node, each drawn by the node's own shard.
    pub async fn indep_sample_negative(
        &self,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        self.lookup_routed(
            nodes,
            |_| None,
            |nodes| {
                IndepNegativeSample(NegativeSampleRequest {
                    count,
                    nodes,
                    excluded_nodes: excluded.to_vec(),
                })
            },
            |r: NegativeSampleResponse| r.sampled_nodes_list,
        )
        .await
    }

    pub async fn sample_neighbor(&self, count: i32, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>> {
        let lists = self
            .lookup_routed(
                nodes,
                |_| None,
                |nodes| RandomNeighborSample(NeighborSampleRequest { count, nodes }),
                |r: NeighborSampleResponse| r.neighbor_nodes_list,
            )
            .await?;
        ensure_any_neighbors(count, &lists)?;
        Ok(lists)
    }

    /// Random walks that may cross shards.
    ///
    /// Each sequence starts with its start node and grows to `walk_lens[i]`
    /// nodes. Every round asks the shard owning each unfinished walk's last
    /// node for the remaining hops; a walk stops early at a dead end. A
    /// start node with no neighbors fails the whole call.
    pub async fn static_traverse(
        &self,
        cur_nodes: &[NodeId],
        walk_lens: &[usize],
        info: &WalkerInfo,
    ) -> Result<Vec<Vec<NodeId>>> {
        if cur_nodes.len() != walk_lens.len() {
            return Err(Error::data(format!(
                "{} start nodes but {} walk lengths",
                cur_nodes.len(),
                walk_lens.len()
            )));
        }
        let mut seqs: Vec<Vec<NodeId>> = cur_nodes.iter().map(|&node| vec![node]).collect();
        let mut continuous: Vec<bool> = walk_lens.iter().map(|&len| len > 1).collect();
        let mut rounds = 0;

        while continuous.iter().any(|&c| c) {
            rounds += 1;
            let mut batch = ShardBatch::new(self.shard_count);
            for (i, seq) in seqs.iter().enumerate() {
                if !continuous[i] {
                    continue;
                }
                let last = seq[seq.len() - 1];
                let remaining = walk_lens[i] - seq.len();
                batch.push(shard_of(last, self.shard_count)?, i, (last, remaining, seq.len() - 1));
            }

            let (requests, indices) = batch.into_requests(|items| {
                StaticRandomWalk(RandomWalkRequest {
                    cur_nodes: items.iter().map(|t| t.0).collect(),
                    walk_lens: items.iter().map(|t| t.1).collect(),
                    offsets: items.iter().map(|t| t.2).collect(),
                    walker_info: info.clone(),
                })
            });
            let responses = fan_out(self.transport.as_ref(), requests, self.timeout).await?;

            for (shard, response) in responses.into_iter().enumerate() {
                let Some(response) = response else {
                    continue;
                };
                let shard_indices = &indices[shard];
                if response.seqs.len() != shard_indices.len() {
                    return Err(Error::rpc(format!(
                        "shard {} answered {} walks for {} requested",
                        shard,
                        response.seqs.len(),
                        shard_indices.len()
                    )));
                }
                for (&i, hops) in shard_indices.iter().zip(response.seqs) {
                    let seq = &mut seqs[i];
                    if hops.is_empty() {
                        if seq.len() == 1 {
                            return Err(Error::data(format!("isolated start node {}", seq[0])));
                        }
                        continuous[i] = false;
                        continue;
                    }
                    seq.extend(hops);
                    if seq.len() >= walk_lens[i] {
                        seq.truncate(walk_lens[i]);
                        continuous[i] = false;
                    }
                }
            }
        }
        debug!("{} walks finished in {} rounds", seqs.len(), rounds);
        Ok(seqs)
    }

    /// Node and neighbor features. Cache hits need both features cached.
    pub async fn lookup_feature(&self, nodes: &[NodeId]) -> Result<(Vec<Feature>, Vec<Feature>)> {
        let mut node_feats = vec![Feature::new(); nodes.len()];
        let mut neigh_feats = vec![Feature::new(); nodes.len()];
        let mut batch = ShardBatch::new(self.shard_count);
        for (i, &node) in nodes.iter().enumerate() {
            match (self.cache.find_node_feature(node), self.cache.find_neighbor_feature(node)) {
                (Some(node_feat), Some(neigh_feat)) => {
                    node_feats[i] = node_feat.clone();
                    neigh_feats[i] = neigh_feat.clone();
                }
                _ => batch.push(shard_of(node, self.shard_count)?, i, node),
            }
        }
        if batch.is_empty() {
            return Ok((node_feats, neigh_feats));
        }

        let (requests, indices) = batch.into_requests(|nodes| LookupFeature(NodesRequest { nodes }));
        let responses = fan_out(self.transport.as_ref(), requests, self.timeout).await?;
        for (shard, response) in responses.into_iter().enumerate() {
            if let Some(response) = response {
                gather(&mut node_feats, shard, &indices[shard], response.node_feats)?;
                gather(&mut neigh_feats, shard, &indices[shard], response.neigh_feats)?;
            }
        }
        Ok((node_feats, neigh_feats))
    }

    pub async fn lookup_node_feature(&self, nodes: &[NodeId]) -> Result<Vec<Feature>> {
        self.lookup_routed(
            nodes,
            |node| self.cache.find_node_feature(node).cloned(),
            |nodes| LookupNodeFeature(NodesRequest { nodes }),
            |r: NodeFeatureResponse| r.node_feats,
        )
        .await
    }

    pub async fn lookup_neighbor_feature(&self, nodes: &[NodeId]) -> Result<Vec<Feature>> {
        self.lookup_routed(
            nodes,
            |node| self.cache.find_neighbor_feature(node).cloned(),
            |nodes| LookupNeighborFeature(NodesRequest { nodes }),
            |r: NeighborFeatureResponse| r.neigh_feats,
        )
        .await
    }

    /// Contexts in input order. Missing nodes get an empty context; the
    /// call fails only when every node is missing.
    pub async fn lookup_context(&self, nodes: &[NodeId]) -> Result<Vec<Context>> {
        let contexts = self
            .lookup_routed(
                nodes,
                |node| self.cache.find_context(node).cloned(),
                |nodes| LookupContext(NodesRequest { nodes }),
                |r: ContextResponse| r.contexts,
            )
            .await?;
        ensure_any_context(&contexts)?;
        Ok(contexts)
    }

    /// The generic scatter/gather: answers cache hits in place, routes the
    /// misses to their shards and writes each shard's answers back to the
    /// positions its nodes came from.
    async fn lookup_routed<C, T>(
        &self,
        nodes: &[NodeId],
        cached: impl Fn(NodeId) -> Option<T>,
        make: impl FnMut(Vec<NodeId>) -> C,
        take: impl Fn(C::Response) -> Vec<T>,
    ) -> Result<Vec<T>>
    where
        C: RpcCall,
        T: Default + Clone,
    {
        let mut out = vec![T::default(); nodes.len()];
        let mut batch = ShardBatch::new(self.shard_count);
        for (i, &node) in nodes.iter().enumerate() {
            match cached(node) {
                Some(hit) => out[i] = hit,
                None => batch.push(shard_of(node, self.shard_count)?, i, node),
            }
        }
        if batch.is_empty() {
            return Ok(out);
        }

        let (requests, indices) = batch.into_requests(make);
        let responses = fan_out(self.transport.as_ref(), requests, self.timeout).await?;
        for (shard, response) in responses.into_iter().enumerate() {
            if let Some(response) = response {
                gather(&mut out, shard, &indices[shard], take(response))?;
            }
        }
        Ok(out)
    }

    /// Pages through every shard's cache-node list until each shard returns
    /// a short page. Returns the union, first-seen order, no duplicates.
    pub async fn scan_cache_nodes(&self) -> Result<Vec<NodeId>> {
        let page = self.max_node_per_rpc;
        let mut active = vec![true; self.shard_count];
        let mut cursor = 0usize;
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        let mut rounds = 0;

        while active.iter().any(|&a| a) {
            rounds += 1;
            let requests = active
                .iter()
                .map(|&a| a.then_some(CacheNodeLookup(CacheNodeRequest { cursor, count: page })))
                .collect();
            let responses = fan_out(self.transport.as_ref(), requests, self.timeout).await?;
            for (shard, response) in responses.into_iter().enumerate() {
                let Some(response) = response else {
                    continue;
                };
                if response.nodes.len() > page {
                    return Err(Error::rpc(format!(
                        "shard {} returned {} cache nodes for a page of {}",
                        shard,
                        response.nodes.len(),
                        page
                    )));
                }
                if response.nodes.len() < page {
                    active[shard] = false;
                }
                nodes.extend(response.nodes.into_iter().filter(|n| seen.insert(*n)));
            }
            cursor += page;
        }
        debug!("cache node scan: {} nodes in {} rounds", nodes.len(), rounds);
        Ok(nodes)
    }

    /// Prefetches context and features of every shard's cache nodes, in
    /// chunks of `max_node_per_rpc`.
    async fn build_cache(&self) -> Result<CacheStorage> {
        let start = Instant::now();
        let nodes = self.scan_cache_nodes().await?;
        let mut cache = CacheStorage::default();
        for chunk in nodes.chunks(self.max_node_per_rpc) {
            let contexts = self
                .lookup_routed(
                    chunk,
                    |_| None,
                    |nodes| LookupContext(NodesRequest { nodes }),
                    |r: ContextResponse| r.contexts,
                )
                .await?;
            let (node_feats, neigh_feats) = self.lookup_feature(chunk).await?;
            for (((&node, context), node_feat), neigh_feat) in
                chunk.iter().zip(contexts).zip(node_feats).zip(neigh_feats)
            {
                cache.insert(node, context, node_feat, neigh_feat);
            }
        }
        info!(
            "cache built: {} nodes in {:?}",
            cache.len(),
            start.elapsed()
        );
        Ok(cache)
    }
}

/// One Alias table per namespace over the shards' frequency of it.
fn build_shard_distribution(freqs: &[Vec<f64>]) -> Result<Vec<Option<AliasSampling>>> {
    let ns_size = freqs.first().map_or(0, Vec::len);
    (0..ns_size)
        .map(|ns| {
            let probs: Vec<f32> = freqs.iter().map(|shard| shard[ns] as f32).collect();
            if probs.iter().sum::<f32>() > 0.0 {
                AliasSampling::new(&probs).map(Some)
            } else {
                Ok(None)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_distribution() {
        let freqs = vec![vec![3.0, 0.0], vec![1.0, 0.0], vec![0.0, 0.0]];
        let distribution = build_shard_distribution(&freqs).unwrap();
        assert_eq!(distribution.len(), 2);
        assert!(distribution[1].is_none());
        let alias = distribution[0].as_ref().unwrap();
        for _ in 0..100 {
            assert_ne!(alias.next(), 2);
        }
    }
}
