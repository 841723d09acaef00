//! Samplers built over a [`SamplerSource`]: negative sampling, neighbor
//! sampling and static random walks.

pub mod builder;
pub mod negative;
pub mod neighbor;
pub mod source;
pub mod walker;

pub use builder::{NegativeSamplerBuilder, NeighborSamplerBuilder};
pub use negative::{NegativeMode, NegativeSampler};
pub use neighbor::{ensure_any_neighbors, NeighborSampler};
pub use source::{DeepSamplerSource, FreqTable, GraphSamplerSource, SamplerSource};
pub use walker::{find_range, RandomWalker};
