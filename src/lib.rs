//! Distributed graph sampling and query engine.
//!
//! A graph is split into shards by `node % shard_count`. Each shard runs a
//! [`server::GraphService`] over its partition; a [`GraphClient`] answers
//! negative sampling, neighbor sampling, random walks and feature/context
//! lookups either in process or by scatter/gather across the shards.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod node;
pub mod ops;
mod parallel;
pub mod rpc;
pub mod sampler;
pub mod sampling;
pub mod server;
pub mod shard;

pub use client::GraphClient;
pub use config::{CacheKind, GraphConfig, SamplingKind};
pub use error::{Error, Result};
pub use graph::{InMemoryGraph, NamespaceTable};
pub use node::{make_node, namespace_of, Context, Feature, NodeId, NsId, WalkerInfo};
