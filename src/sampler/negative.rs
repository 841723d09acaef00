use super::builder::NegativeSamplerBuilder;
use crate::error::{Error, Result};
use crate::node::{namespace_of, NodeId, NsId};
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::error;

/// Draw budget per requested sample before giving up.
const MAX_DRAWS_PER_SAMPLE: usize = 100_000;

/// How samples are shared across the query nodes of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeMode {
    /// One pool per touched namespace, indexed by namespace id.
    Shared,
    /// One pool per query node, parallel to the input.
    Independent,
}

/// Draws negative samples from the namespace-level distribution of a
/// [`NegativeSamplerBuilder`].
pub struct NegativeSampler {
    builder: Arc<NegativeSamplerBuilder>,
}

impl NegativeSampler {
    pub fn new(builder: Arc<NegativeSamplerBuilder>) -> Self {
        NegativeSampler { builder }
    }

    pub fn sample(
        &self,
        mode: NegativeMode,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        let mut rng = rand::rng();
        match mode {
            NegativeMode::Shared => self.sample_shared(&mut rng, count, nodes, excluded),
            NegativeMode::Independent => self.sample_independent(&mut rng, count, nodes, excluded),
        }
    }

    /// Samples `count` nodes once per namespace touched by `nodes`.
    ///
    /// The result has one slot per namespace id; slots of untouched
    /// namespaces stay empty.
    pub fn sample_shared(
        &self,
        rng: &mut dyn RngCore,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        let ns_size = self.builder.source().ns_size();
        let touched = touched_namespaces(nodes, ns_size)?;
        let mut sampled = vec![Vec::new(); ns_size];
        for (ns, representative) in touched {
            sampled[ns as usize] = self.do_sampling(rng, count, representative, excluded)?;
        }
        Ok(sampled)
    }

    /// Samples `count` nodes for every query node.
    pub fn sample_independent(
        &self,
        rng: &mut dyn RngCore,
        count: usize,
        nodes: &[NodeId],
        excluded: &[NodeId],
    ) -> Result<Vec<Vec<NodeId>>> {
        nodes
            .iter()
            .map(|&node| self.do_sampling(rng, count, node, excluded))
            .collect()
    }

    /// Draws until `count` distinct, non-excluded nodes from the namespace of
    /// `node` are collected.
    fn do_sampling(
        &self,
        rng: &mut dyn RngCore,
        count: usize,
        node: NodeId,
        excluded: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        self.draw_distinct(rng, count, node, excluded, count.saturating_mul(MAX_DRAWS_PER_SAMPLE))
    }

    fn draw_distinct(
        &self,
        rng: &mut dyn RngCore,
        count: usize,
        node: NodeId,
        excluded: &[NodeId],
        max_draws: usize,
    ) -> Result<Vec<NodeId>> {
        let ns = namespace_of(node);
        let candidates = self.builder.candidates(ns).map_err(|e| {
            error!("negative sampling for node {} failed: {}", node, e);
            e
        })?;
        if count == 0 {
            return Ok(Vec::new());
        }

        // Only candidates the kernel can actually return count. Cheap bound
        // first; count exactly only when it might not hold.
        if self.builder.support_len(ns)? < count + excluded.len() {
            let excluded_set: HashSet<NodeId> = excluded.iter().copied().collect();
            let mut admissible = 0;
            for (i, candidate) in candidates.iter().enumerate() {
                if !excluded_set.contains(candidate) && self.builder.is_drawable(ns, i)? {
                    admissible += 1;
                }
            }
            if admissible < count {
                return Err(Error::data(format!(
                    "namespace {} has {} admissible candidates, {} requested",
                    ns, admissible, count
                )));
            }
        }

        let mut sampled = Vec::with_capacity(count);
        for _ in 0..max_draws {
            let next = self.builder.sample(rng, node)?;
            if excluded.contains(&next) || sampled.contains(&next) {
                continue;
            }
            sampled.push(next);
            if sampled.len() == count {
                return Ok(sampled);
            }
        }
        Err(Error::data(format!(
            "namespace {}: {} of {} distinct negatives after {} draws",
            ns,
            sampled.len(),
            count,
            max_draws
        )))
    }
}

/// Distinct namespaces of `nodes` in first-seen order, each with the first
/// node that touched it.
pub(crate) fn touched_namespaces(nodes: &[NodeId], ns_size: usize) -> Result<Vec<(NsId, NodeId)>> {
    let mut touched: Vec<(NsId, NodeId)> = Vec::new();
    for &node in nodes {
        let ns = namespace_of(node);
        if ns as usize >= ns_size {
            return Err(Error::data(format!(
                "node {} has namespace {}, outside the {} configured",
                node, ns, ns_size
            )));
        }
        if !touched.iter().any(|t| t.0 == ns) {
            touched.push((ns, node));
            if touched.len() == ns_size {
                break;
            }
        }
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingKind;
    use crate::graph::{InMemoryGraph, NamespaceTable};
    use crate::node::make_node;
    use crate::sampler::source::{DeepSamplerSource, FreqTable, GraphSamplerSource, SamplerSource};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sampler(kind: SamplingKind) -> NegativeSampler {
        let namespaces = NamespaceTable::from_pairs([("user", 0), ("item", 1)]).unwrap();
        let mut builder = InMemoryGraph::builder(namespaces);
        for i in 0..10u64 {
            builder.add_context(i, vec![((i + 1) % 10, 1.0), (make_node(1, i), 1.0)]);
        }
        let source: Arc<dyn SamplerSource> =
            Arc::new(GraphSamplerSource::new(Arc::new(builder.build().unwrap())));
        NegativeSampler::new(Arc::new(NegativeSamplerBuilder::new(source, kind).unwrap()))
    }

    #[test]
    fn test_shared_groups_by_namespace() {
        let sampler = sampler(SamplingKind::Alias);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let sampled = sampler
            .sample_shared(&mut rng, 4, &[1, 2, make_node(1, 3)], &[])
            .unwrap();
        assert_eq!(sampled.len(), 2);
        assert_eq!(sampled[0].len(), 4);
        assert!(sampled[0].iter().all(|&n| namespace_of(n) == 0));
        assert!(sampled[1].iter().all(|&n| namespace_of(n) == 1));
    }

    #[test]
    fn test_independent_is_parallel_to_input() {
        let sampler = sampler(SamplingKind::Uniform);
        let nodes = [3, make_node(1, 2), 4];
        let sampled = sampler
            .sample(NegativeMode::Independent, 3, &nodes, &[])
            .unwrap();
        assert_eq!(sampled.len(), 3);
        assert!(sampled[1].iter().all(|&n| namespace_of(n) == 1));
        for pool in &sampled {
            let unique: HashSet<_> = pool.iter().collect();
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn test_excluded_never_returned() {
        let excluded = [0, 1, 2, 3, 4, 5];
        for kind in [
            SamplingKind::Uniform,
            SamplingKind::Alias,
            SamplingKind::Unigram,
            SamplingKind::PartialSum,
        ] {
            let sampler = sampler(kind);
            let sampled = sampler.sample(NegativeMode::Shared, 4, &[7], &excluded).unwrap();
            let mut pool = sampled[0].clone();
            pool.sort_unstable();
            assert_eq!(pool, vec![6, 7, 8, 9]);
        }
    }

    #[test]
    fn test_not_enough_candidates() {
        let sampler = sampler(SamplingKind::Alias);
        assert!(matches!(
            sampler.sample(NegativeMode::Shared, 5, &[7], &[0, 1, 2, 3, 4, 5]),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn test_skewed_unigram_terminates() {
        let table = FreqTable::from_counts(
            NamespaceTable::single(),
            [(0, 1e6), (1, 1.0), (2, 1.0), (3, 1.0)],
        )
        .unwrap();
        let source: Arc<dyn SamplerSource> = Arc::new(DeepSamplerSource::new(table));
        let sampler = NegativeSampler::new(Arc::new(
            NegativeSamplerBuilder::new(source, SamplingKind::Unigram).unwrap(),
        ));
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        for _ in 0..20 {
            let pool = &sampler.sample_shared(&mut rng, 2, &[0], &[]).unwrap()[0];
            assert_eq!(pool.len(), 2);
            assert_ne!(pool[0], pool[1]);
        }
        let pool = &sampler.sample_shared(&mut rng, 3, &[0], &[0]).unwrap()[0];
        let mut pool = pool.clone();
        pool.sort_unstable();
        assert_eq!(pool, vec![1, 2, 3]);
        assert!(matches!(
            sampler.sample_shared(&mut rng, 4, &[0], &[2]),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn test_draw_budget_exhausted_is_data_error() {
        let sampler = sampler(SamplingKind::Alias);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(matches!(
            sampler.draw_distinct(&mut rng, 2, 0, &[], 1),
            Err(Error::Data(_))
        ));
        assert_eq!(sampler.draw_distinct(&mut rng, 1, 0, &[], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_namespace_fails_call() {
        let sampler = sampler(SamplingKind::Alias);
        assert!(sampler
            .sample(NegativeMode::Independent, 1, &[1, make_node(3, 1)], &[])
            .is_err());
        assert!(sampler.sample(NegativeMode::Shared, 1, &[make_node(3, 1)], &[]).is_err());
    }
}
