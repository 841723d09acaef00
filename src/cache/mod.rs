//! Client cache: which nodes to prefetch (server side) and where the
//! prefetched data lives (client side).

mod node_builder;
mod storage;

pub use node_builder::select_cache_nodes;
pub use storage::CacheStorage;
