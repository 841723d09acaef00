//! Shard routing and the map/reduce bookkeeping shared by every
//! distributed op.

use crate::error::{Error, Result};
use crate::node::NodeId;

/// `node % shard_count`, on the raw id including namespace bits.
pub fn shard_of(node: NodeId, shard_count: usize) -> Result<usize> {
    if shard_count == 0 {
        return Err(Error::config("shard count must be > 0"));
    }
    Ok((node % shard_count as u64) as usize)
}

/// Map phase of a scatter/gather call.
///
/// Each shard gets the items routed to it plus the original batch position
/// of every item, in append order.
#[derive(Debug, Clone)]
pub struct ShardBatch<T> {
    items: Vec<Vec<T>>,
    indices: Vec<Vec<usize>>,
}

impl<T> ShardBatch<T> {
    pub fn new(shard_count: usize) -> Self {
        ShardBatch {
            items: (0..shard_count).map(|_| Vec::new()).collect(),
            indices: vec![Vec::new(); shard_count],
        }
    }

    pub fn shard_count(&self) -> usize {
        self.items.len()
    }

    pub fn push(&mut self, shard: usize, index: usize, item: T) {
        self.items[shard].push(item);
        self.indices[shard].push(index);
    }

    /// Items per shard. Zero means the shard is skipped.
    pub fn masks(&self) -> Vec<usize> {
        self.items.iter().map(Vec::len).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.iter().all(Vec::is_empty)
    }

    /// Turns every non-empty shard's items into a request.
    pub fn into_requests<R>(self, mut make: impl FnMut(Vec<T>) -> R) -> (Vec<Option<R>>, Vec<Vec<usize>>) {
        let requests = self
            .items
            .into_iter()
            .map(|items| (!items.is_empty()).then(|| make(items)))
            .collect();
        (requests, self.indices)
    }
}

impl ShardBatch<NodeId> {
    /// Routes every node of `nodes`.
    pub fn by_node(nodes: &[NodeId], shard_count: usize) -> Result<Self> {
        let mut batch = ShardBatch::new(shard_count);
        for (i, &node) in nodes.iter().enumerate() {
            batch.push(shard_of(node, shard_count)?, i, node);
        }
        Ok(batch)
    }
}

/// Reduce phase: writes one shard's response elements back to the batch
/// positions they were taken from.
pub fn gather<U>(out: &mut [U], shard: usize, indices: &[usize], values: Vec<U>) -> Result<()> {
    if indices.len() != values.len() {
        return Err(Error::rpc(format!(
            "shard {} answered {} entries for {} requested",
            shard,
            values.len(),
            indices.len()
        )));
    }
    for (&index, value) in indices.iter().zip(values) {
        match out.get_mut(index) {
            Some(slot) => *slot = value,
            None => {
                return Err(Error::rpc(format!(
                    "shard {} answered for position {} outside a batch of {}",
                    shard,
                    index,
                    out.len()
                )))
            }
        }
    }
    Ok(())
}
