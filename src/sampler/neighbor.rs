use super::builder::NeighborSamplerBuilder;
use crate::error::{Error, Result};
use crate::node::NodeId;
use rand::RngCore;
use std::sync::Arc;
use tracing::warn;

/// Draw budget per requested neighbor before giving up.
const MAX_DRAWS_PER_NEIGHBOR: usize = 100_000;

/// Samples neighbors of each query node through a [`NeighborSamplerBuilder`].
pub struct NeighborSampler {
    builder: Arc<NeighborSamplerBuilder>,
}

impl NeighborSampler {
    pub fn new(builder: Arc<NeighborSamplerBuilder>) -> Self {
        NeighborSampler { builder }
    }

    pub fn sample(&self, count: i32, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>> {
        self.sample_with(&mut rand::rng(), count, nodes)
    }

    /// One neighbor list per query node.
    ///
    /// * `count < 0` or `count == degree`: every neighbor, in context order.
    /// * `count < degree`: `count` distinct neighbors.
    /// * `count > degree`: `count` draws with replacement.
    ///
    /// A node without a context yields an empty list. The call fails only
    /// when every node comes back empty.
    pub fn sample_with(
        &self,
        rng: &mut dyn RngCore,
        count: i32,
        nodes: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        let result = self.sample_partial(rng, count, nodes);
        ensure_any_neighbors(count, &result)?;
        Ok(result)
    }

    /// Like [`sample_with`](Self::sample_with) but never fails, so a shard
    /// can answer for its slice of a batch and leave the all-empty check to
    /// the caller that sees the whole batch.
    pub fn sample_partial(&self, rng: &mut dyn RngCore, count: i32, nodes: &[NodeId]) -> Vec<Vec<NodeId>> {
        let source = self.builder.source();
        let mut result = Vec::with_capacity(nodes.len());
        for &node in nodes {
            let Some(context) = source.find_context(node) else {
                warn!("node {} has no context, returning no neighbors", node);
                result.push(Vec::new());
                continue;
            };
            let degree = context.len();
            let neighbors = if count < 0 || count as usize == degree {
                context.iter().map(|p| p.0).collect()
            } else if (count as usize) < degree {
                self.without_replacement(rng, node, count as usize)
            } else {
                self.with_replacement(rng, node, count as usize)
            };
            result.push(neighbors);
        }
        result
    }

    /// `count` distinct neighbors, or every drawable neighbor when the kernel
    /// cannot reach `count` of them.
    fn without_replacement(&self, rng: &mut dyn RngCore, node: NodeId, count: usize) -> Vec<NodeId> {
        let support = self.builder.support_len(node);
        if support <= count {
            let drawable = self.builder.drawable_neighbors(node).unwrap_or_default();
            if drawable.len() < count {
                warn!(
                    "node {} has {} drawable neighbors, {} requested",
                    node,
                    drawable.len(),
                    count
                );
            }
            return drawable;
        }

        let mut picked = Vec::with_capacity(count);
        for _ in 0..count.saturating_mul(MAX_DRAWS_PER_NEIGHBOR) {
            match self.builder.sample(rng, node) {
                Some(next) if !picked.contains(&next) => picked.push(next),
                Some(_) => {}
                None => break,
            }
            if picked.len() == count {
                return picked;
            }
        }
        warn!(
            "node {}: {} of {} distinct neighbors before the draw budget ran out",
            node,
            picked.len(),
            count
        );
        picked
    }

    fn with_replacement(&self, rng: &mut dyn RngCore, node: NodeId, count: usize) -> Vec<NodeId> {
        (0..count)
            .map_while(|_| self.builder.sample(rng, node))
            .collect()
    }
}

/// Fails when a non-zero `count` produced no neighbor for any node.
pub fn ensure_any_neighbors(count: i32, lists: &[Vec<NodeId>]) -> Result<()> {
    if count != 0 && !lists.is_empty() && lists.iter().all(Vec::is_empty) {
        return Err(Error::data(format!(
            "none of the {} query nodes has neighbors",
            lists.len()
        )));
    }
    Ok(())
}
