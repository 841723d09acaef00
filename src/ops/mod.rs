//! Query ops. [`LocalOps`] answers against one in-memory partition;
//! [`DistOps`] routes the same queries across shards.

mod dist;
mod local;

pub use dist::DistOps;
pub use local::{ensure_any_context, LocalOps};
