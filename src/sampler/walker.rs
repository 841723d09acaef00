use super::builder::NeighborSamplerBuilder;
use crate::error::{Error, Result};
use crate::node::{namespace_of, NodeId, NsId, WalkerInfo};
use rand::RngCore;
use std::sync::Arc;

/// Static random walker: each hop draws from the fixed neighbor
/// distribution of the current node.
pub struct RandomWalker {
    builder: Arc<NeighborSamplerBuilder>,
    meta_path: bool,
}

impl RandomWalker {
    /// Walker for unconstrained walks only.
    pub fn new(builder: Arc<NeighborSamplerBuilder>) -> Self {
        RandomWalker {
            builder,
            meta_path: false,
        }
    }

    /// Walker that also accepts meta-path constrained walks. Fails when the
    /// builder's kernel cannot draw from a sub-range of a context.
    pub fn with_meta_path(builder: Arc<NeighborSamplerBuilder>) -> Result<Self> {
        if !builder.supports_range() {
            return Err(Error::config(format!(
                "meta-path walks need ranged draws, which the {} neighbor sampler does not support",
                builder.kind().name()
            )));
        }
        Ok(RandomWalker {
            builder,
            meta_path: true,
        })
    }

    pub fn traverse(
        &self,
        cur_nodes: &[NodeId],
        walk_lens: &[usize],
        info: &WalkerInfo,
    ) -> Result<Vec<Vec<NodeId>>> {
        self.traverse_with(&mut rand::rng(), cur_nodes, walk_lens, &[], info)
    }

    /// Walks `walk_lens[i]` hops from `cur_nodes[i]`.
    ///
    /// Sequences hold the hops only, not the start node; a walk that hits a
    /// node without neighbors ends early. `offsets[i]` is the number of hops
    /// already taken by a walk being continued, which keeps its meta-path
    /// phase; an empty slice means all zero.
    pub fn traverse_with(
        &self,
        rng: &mut dyn RngCore,
        cur_nodes: &[NodeId],
        walk_lens: &[usize],
        offsets: &[usize],
        info: &WalkerInfo,
    ) -> Result<Vec<Vec<NodeId>>> {
        if cur_nodes.len() != walk_lens.len() || (!offsets.is_empty() && offsets.len() != cur_nodes.len()) {
            return Err(Error::data(format!(
                "walk batch sizes differ: {} nodes, {} lengths, {} offsets",
                cur_nodes.len(),
                walk_lens.len(),
                offsets.len()
            )));
        }
        if !info.meta_path.is_empty() && !self.meta_path {
            return Err(Error::config("this walker was not built for meta-path walks"));
        }

        let mut seqs = Vec::with_capacity(cur_nodes.len());
        for (i, (&start, &len)) in cur_nodes.iter().zip(walk_lens).enumerate() {
            let offset = offsets.get(i).copied().unwrap_or(0);
            let mut seq = Vec::with_capacity(len);
            let mut cur = start;
            for hop in 0..len {
                let next = if info.meta_path.is_empty() {
                    self.builder.sample(rng, cur)
                } else {
                    let expected = info.meta_path[(offset + hop + 1) % info.meta_path.len()];
                    self.constrained_step(rng, cur, expected)?
                };
                match next {
                    Some(next) => {
                        seq.push(next);
                        cur = next;
                    }
                    None => break,
                }
            }
            seqs.push(seq);
        }
        Ok(seqs)
    }

    fn constrained_step(&self, rng: &mut dyn RngCore, cur: NodeId, expected: NsId) -> Result<Option<NodeId>> {
        let Some(context) = self.builder.source().find_context(cur) else {
            return Ok(None);
        };
        match find_range(context, expected) {
            Some((begin, end)) => self.builder.sample_in_range(rng, cur, begin, end),
            None => Ok(None),
        }
    }
}

/// Index range `[begin, end)` of the neighbors in namespace `ns`.
///
/// `context` must be sorted by neighbor id.
pub fn find_range(context: &[(NodeId, f32)], ns: NsId) -> Option<(usize, usize)> {
    let begin = context.partition_point(|p| namespace_of(p.0) < ns);
    let end = context.partition_point(|p| namespace_of(p.0) <= ns);
    (begin < end).then_some((begin, end))
}
