//! Binds sampling kernels to a [`SamplerSource`].
//!
//! Both builders are configured once. In uniform mode they keep no tables and
//! draw straight from the live candidate list; in frequency mode they own one
//! immutable kernel per namespace (negative) or per node (neighbor).

use super::source::SamplerSource;
use crate::config::SamplingKind;
use crate::error::{Error, Result};
use crate::node::{namespace_of, NodeId, NsId};
use crate::parallel::{chunk_len, thread_pool};
use crate::sampling::{new_sampling, Sampling};
use rand::{Rng, RngCore};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const NEGATIVE_POWER: f32 = 0.75;

/// Namespace-level distribution over every node of that namespace.
pub struct NegativeSamplerBuilder {
    source: Arc<dyn SamplerSource>,
    kind: SamplingKind,
    /// Indexed by namespace id. Empty in uniform mode.
    tables: Vec<Option<Box<dyn Sampling>>>,
}

impl NegativeSamplerBuilder {
    pub fn new(source: Arc<dyn SamplerSource>, kind: SamplingKind) -> Result<Self> {
        let tables = match kind {
            SamplingKind::Uniform => Vec::new(),
            _ => build_namespace_tables(source.as_ref(), kind)?,
        };
        Ok(NegativeSamplerBuilder {
            source,
            kind,
            tables,
        })
    }

    pub fn source(&self) -> &Arc<dyn SamplerSource> {
        &self.source
    }

    pub fn kind(&self) -> SamplingKind {
        self.kind
    }

    /// Candidate pool of namespace `ns`.
    pub fn candidates(&self, ns: NsId) -> Result<&[NodeId]> {
        if !self.source.namespaces().contains(ns) {
            return Err(Error::data(format!("namespace {} is not configured", ns)));
        }
        match self.source.nodes_list().get(ns as usize) {
            Some(nodes) if !nodes.is_empty() => Ok(nodes),
            _ => Err(Error::data(format!("namespace {} has no candidate nodes", ns))),
        }
    }

    /// Number of candidates of `ns` a draw can return.
    pub fn support_len(&self, ns: NsId) -> Result<usize> {
        let candidates = self.candidates(ns)?;
        Ok(match self.table(ns)? {
            Some(table) => table.support_len(),
            None => candidates.len(),
        })
    }

    /// Whether `candidates(ns)[index]` can ever be drawn.
    pub fn is_drawable(&self, ns: NsId, index: usize) -> Result<bool> {
        let candidates = self.candidates(ns)?;
        Ok(match self.table(ns)? {
            Some(table) => table.is_reachable(index),
            None => index < candidates.len(),
        })
    }

    /// Draws one node from the namespace of `node`.
    pub fn sample(&self, rng: &mut dyn RngCore, node: NodeId) -> Result<NodeId> {
        let ns = namespace_of(node);
        let candidates = self.candidates(ns)?;
        let idx = match self.table(ns)? {
            Some(table) => table.sample(rng),
            None => rng.random_range(0..candidates.len()),
        };
        Ok(candidates[idx])
    }

    /// Draws one node from `candidates(ns)[begin..end]`.
    pub fn sample_in_range(
        &self,
        rng: &mut dyn RngCore,
        node: NodeId,
        begin: usize,
        end: usize,
    ) -> Result<NodeId> {
        let ns = namespace_of(node);
        let candidates = self.candidates(ns)?;
        if begin >= end || end > candidates.len() {
            return Err(Error::data(format!(
                "range [{}, {}) outside namespace {} of {} nodes",
                begin,
                end,
                ns,
                candidates.len()
            )));
        }
        let idx = match self.table(ns)? {
            Some(table) => table.sample_in_range(rng, begin, end)?,
            None => rng.random_range(begin..end),
        };
        Ok(candidates[idx])
    }

    pub fn next(&self, node: NodeId) -> Result<NodeId> {
        self.sample(&mut rand::rng(), node)
    }

    pub fn next_in_range(&self, node: NodeId, begin: usize, end: usize) -> Result<NodeId> {
        self.sample_in_range(&mut rand::rng(), node, begin, end)
    }

    fn table(&self, ns: NsId) -> Result<Option<&dyn Sampling>> {
        if self.kind == SamplingKind::Uniform {
            return Ok(None);
        }
        match self.tables.get(ns as usize) {
            Some(Some(table)) => Ok(Some(table.as_ref())),
            _ => Err(Error::data(format!("namespace {} has no sampling table", ns))),
        }
    }
}

fn build_namespace_tables(
    source: &dyn SamplerSource,
    kind: SamplingKind,
) -> Result<Vec<Option<Box<dyn Sampling>>>> {
    let ns_size = source.ns_size();
    let mut tables: Vec<Option<Box<dyn Sampling>>> = (0..ns_size).map(|_| None).collect();
    for (ns, name) in source.namespaces().id_name_map() {
        let freqs = match source.freqs_list().get(*ns as usize) {
            Some(freqs) if !freqs.is_empty() => freqs,
            _ => {
                warn!("namespace {} ({}) has no nodes, skipping its negative table", ns, name);
                continue;
            }
        };
        if let Some(bad) = freqs.iter().find(|f| !(**f > 0.0)) {
            return Err(Error::data(format!(
                "namespace {} ({}) has a non-positive frequency {}",
                ns, name, bad
            )));
        }
        let powered: Vec<f32> = freqs.iter().map(|f| f.powf(NEGATIVE_POWER)).collect();
        let sum: f32 = powered.iter().sum();
        let probs: Vec<f32> = powered.iter().map(|p| p / sum).collect();
        tables[*ns as usize] = Some(new_sampling(kind, &probs)?);
    }
    Ok(tables)
}

/// Per-node distribution over that node's weighted neighbors.
pub struct NeighborSamplerBuilder {
    source: Arc<dyn SamplerSource>,
    kind: SamplingKind,
    /// Empty in uniform mode.
    tables: HashMap<NodeId, Box<dyn Sampling>>,
}

impl NeighborSamplerBuilder {
    /// # Arguments
    ///
    /// * `source` - Graph the contexts come from.
    /// * `kind` - Kernel per node, or `Uniform` for table-free draws.
    /// * `threads` - Workers for the frequency-mode build.
    pub fn new(source: Arc<dyn SamplerSource>, kind: SamplingKind, threads: usize) -> Result<Self> {
        let tables = match kind {
            SamplingKind::Uniform => HashMap::new(),
            _ => build_node_tables(source.as_ref(), kind, threads)?,
        };
        Ok(NeighborSamplerBuilder {
            source,
            kind,
            tables,
        })
    }

    pub fn source(&self) -> &Arc<dyn SamplerSource> {
        &self.source
    }

    pub fn kind(&self) -> SamplingKind {
        self.kind
    }

    pub fn supports_range(&self) -> bool {
        self.kind.supports_range()
    }

    /// Neighbors of `node` a draw can return, in context order. `None` when
    /// the node has no context.
    pub fn drawable_neighbors(&self, node: NodeId) -> Option<Vec<NodeId>> {
        let context = self.source.find_context(node)?;
        match self.kind {
            SamplingKind::Uniform => Some(context.iter().map(|p| p.0).collect()),
            _ => {
                let table = self.tables.get(&node)?;
                Some(
                    context
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| table.is_reachable(*i))
                        .map(|(_, p)| p.0)
                        .collect(),
                )
            }
        }
    }

    /// Number of neighbors of `node` a draw can return.
    pub fn support_len(&self, node: NodeId) -> usize {
        match self.kind {
            SamplingKind::Uniform => self.source.find_context(node).map_or(0, |c| c.len()),
            _ => self.tables.get(&node).map_or(0, |t| t.support_len()),
        }
    }

    /// Draws one neighbor of `node`. `None` when the node has no context.
    pub fn sample(&self, rng: &mut dyn RngCore, node: NodeId) -> Option<NodeId> {
        let context = self.source.find_context(node)?;
        if context.is_empty() {
            return None;
        }
        let idx = match self.kind {
            SamplingKind::Uniform => rng.random_range(0..context.len()),
            _ => self.tables.get(&node)?.sample(rng),
        };
        context.get(idx).map(|p| p.0)
    }

    /// Draws one neighbor among `context[begin..end]`.
    pub fn sample_in_range(
        &self,
        rng: &mut dyn RngCore,
        node: NodeId,
        begin: usize,
        end: usize,
    ) -> Result<Option<NodeId>> {
        let Some(context) = self.source.find_context(node) else {
            return Ok(None);
        };
        if begin >= end || end > context.len() {
            return Err(Error::data(format!(
                "range [{}, {}) outside context of node {} with {} neighbors",
                begin,
                end,
                node,
                context.len()
            )));
        }
        let idx = match self.kind {
            SamplingKind::Uniform => rng.random_range(begin..end),
            _ => match self.tables.get(&node) {
                Some(table) => table.sample_in_range(rng, begin, end)?,
                None => return Ok(None),
            },
        };
        Ok(context.get(idx).map(|p| p.0))
    }

    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.sample(&mut rand::rng(), node)
    }

    pub fn next_in_range(&self, node: NodeId, begin: usize, end: usize) -> Result<Option<NodeId>> {
        self.sample_in_range(&mut rand::rng(), node, begin, end)
    }
}

/// Builds one table per key in parallel. Each worker fills a private map
/// over its own slice of keys; the maps are merged once all succeed.
fn build_node_tables(
    source: &dyn SamplerSource,
    kind: SamplingKind,
    threads: usize,
) -> Result<HashMap<NodeId, Box<dyn Sampling>>> {
    let start = Instant::now();
    let keys = source.node_keys()?;
    let pool = thread_pool(threads)?;
    let chunk = chunk_len(keys.len(), pool.current_num_threads());

    let partials: Vec<HashMap<NodeId, Box<dyn Sampling>>> = pool.install(|| {
        keys.par_chunks(chunk)
            .map(|slice| -> Result<HashMap<NodeId, Box<dyn Sampling>>> {
                let mut local = HashMap::with_capacity(slice.len());
                for &node in slice {
                    local.insert(node, node_table(source, kind, node)?);
                }
                Ok(local)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut tables = HashMap::with_capacity(keys.len());
    for partial in partials {
        tables.extend(partial);
    }
    info!(
        "built {} {} neighbor tables in {:?}",
        tables.len(),
        kind.name(),
        start.elapsed()
    );
    Ok(tables)
}

fn node_table(source: &dyn SamplerSource, kind: SamplingKind, node: NodeId) -> Result<Box<dyn Sampling>> {
    let context = source
        .find_context(node)
        .ok_or_else(|| Error::data(format!("node {} has no context", node)))?;
    if context.is_empty() {
        return Err(Error::data(format!("node {} has an empty context", node)));
    }
    if let Some((neighbor, weight)) = context.iter().find(|p| !(p.1 > 0.0)) {
        return Err(Error::data(format!(
            "edge {} -> {} has non-positive weight {}",
            node, neighbor, weight
        )));
    }
    let sum: f32 = context.iter().map(|p| p.1).sum();
    let probs: Vec<f32> = context.iter().map(|p| p.1 / sum).collect();
    new_sampling(kind, &probs)
}
