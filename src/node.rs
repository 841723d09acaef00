//! Node ids, namespaces and the small value types shared by every layer.

use serde::{Deserialize, Serialize};

/// Raw 64-bit node id. The high 12 bits carry the namespace.
pub type NodeId = u64;

/// Namespace (heterogeneous node type) id.
pub type NsId = u16;

/// Weighted adjacency of a node, sorted by (namespace, neighbor id).
pub type Context = Vec<(NodeId, f32)>;

/// Opaque (feature id, value) pairs attached to a node.
pub type Feature = Vec<(u64, f32)>;

pub const NAMESPACE_BITS: u32 = 12;
pub const SEQUENCE_BITS: u32 = 64 - NAMESPACE_BITS;
pub const MAX_NAMESPACES: usize = 1 << NAMESPACE_BITS;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Namespace encoded in the high bits of `node`.
#[inline]
pub fn namespace_of(node: NodeId) -> NsId {
    (node >> SEQUENCE_BITS) as NsId
}

/// Composes a node id from a namespace and an in-namespace sequence number.
///
/// Sequence bits above the low 52 are dropped.
#[inline]
pub fn make_node(ns: NsId, seq: u64) -> NodeId {
    ((ns as u64) << SEQUENCE_BITS) | (seq & SEQUENCE_MASK)
}

/// The sentinel returned for a node that was queried but has no feature.
///
/// It is a single `(0, 0.0)` pair rather than an empty vector so callers can
/// tell "absent" apart from "never filled".
pub fn empty_feature() -> Feature {
    vec![(0, 0.0)]
}

pub fn is_empty_feature(feature: &[(u64, f32)]) -> bool {
    feature.len() == 1 && feature[0].0 == 0 && feature[0].1 == 0.0
}

/// Per-call walk options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerInfo {
    /// Cyclic sequence of namespaces. `meta_path[0]` is the namespace of the
    /// start node; hop `i` must land on `meta_path[(i + 1) % len]`.
    /// Empty means an unconstrained walk.
    pub meta_path: Vec<NsId>,
}

impl WalkerInfo {
    pub fn with_meta_path(meta_path: Vec<NsId>) -> Self {
        WalkerInfo { meta_path }
    }
}
