use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of nodes carried by one paginated RPC.
pub const DEFAULT_MAX_NODE_PER_RPC: usize = 2000;

/// Sampling kernel selector.
///
/// `Uniform` also switches the sampler builders into their table-free mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingKind {
    Uniform,
    Alias,
    /// word2vec-style unigram table.
    Unigram,
    PartialSum,
}

impl SamplingKind {
    pub fn name(&self) -> &'static str {
        match self {
            SamplingKind::Uniform => "uniform",
            SamplingKind::Alias => "alias",
            SamplingKind::Unigram => "unigram",
            SamplingKind::PartialSum => "partial_sum",
        }
    }

    /// Whether tables of this kind can draw from a sub-range of indices.
    pub fn supports_range(&self) -> bool {
        matches!(self, SamplingKind::Uniform | SamplingKind::PartialSum)
    }
}

impl TryFrom<i32> for SamplingKind {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(SamplingKind::Uniform),
            1 => Ok(SamplingKind::Alias),
            2 => Ok(SamplingKind::Unigram),
            3 => Ok(SamplingKind::PartialSum),
            other => Err(Error::config(format!(
                "sampling type must be one of UNIFORM(0), ALIAS(1), UNIGRAM(2), PARTIAL_SUM(3), got {}",
                other
            ))),
        }
    }
}

/// Cache node selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Random,
    Degree,
    Importance,
}

impl TryFrom<i32> for CacheKind {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(CacheKind::Random),
            1 => Ok(CacheKind::Degree),
            2 => Ok(CacheKind::Importance),
            other => Err(Error::config(format!(
                "cache type must be one of RANDOM(0), DEGREE(1), IMPORTANCE(2), got {}",
                other
            ))),
        }
    }
}

/// Configuration shared by graph servers and local clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Adjacency file: `node id:weight id:weight ...` per line.
    pub node_graph: Option<PathBuf>,
    /// Namespace config: `name id` per line.
    pub node_config: Option<PathBuf>,
    pub node_feature: Option<PathBuf>,
    pub neighbor_feature: Option<PathBuf>,

    pub negative_sampler: SamplingKind,
    pub neighbor_sampler: SamplingKind,
    /// Build the random walker with meta-path support.
    pub enable_meta_path: bool,

    pub shard_num: usize,
    pub shard_id: usize,
    /// Worker threads for parallel builds and the server runtime. 0 means
    /// one per core.
    pub thread_num: usize,
    /// Semicolon-separated `host:port` list, one per shard.
    pub ip_ports: String,

    pub cache_type: CacheKind,
    /// 0 disables caching.
    pub cache_thld: f64,
    pub max_node_per_rpc: usize,
    /// Per-shard RPC deadline. 0 waits forever.
    pub rpc_timeout_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            node_graph: None,
            node_config: None,
            node_feature: None,
            neighbor_feature: None,
            negative_sampler: SamplingKind::Alias,
            neighbor_sampler: SamplingKind::Alias,
            enable_meta_path: false,
            shard_num: 1,
            shard_id: 0,
            thread_num: 0,
            ip_ports: String::new(),
            cache_type: CacheKind::Degree,
            cache_thld: 0.0,
            max_node_per_rpc: DEFAULT_MAX_NODE_PER_RPC,
            rpc_timeout_ms: 60_000,
        }
    }
}

impl GraphConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: GraphConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Construction-time checks. Every failure here is fatal for the
    /// server or client being built.
    pub fn validate(&self) -> Result<()> {
        if self.shard_num == 0 {
            return Err(Error::config("shard_num must be > 0"));
        }
        if self.shard_id >= self.shard_num {
            return Err(Error::config(format!(
                "shard_id must be < shard_num, got {} vs {}",
                self.shard_id, self.shard_num
            )));
        }
        if !(self.cache_thld >= 0.0) {
            return Err(Error::config(format!(
                "cache_thld must be >= 0, got {}",
                self.cache_thld
            )));
        }
        if self.max_node_per_rpc == 0 {
            return Err(Error::config("max_node_per_rpc must be > 0"));
        }
        if self.enable_meta_path && !self.neighbor_sampler.supports_range() {
            return Err(Error::config(format!(
                "meta-path walks need ranged draws, which the {} neighbor sampler does not support",
                self.neighbor_sampler.name()
            )));
        }
        Ok(())
    }

    /// Shard addresses in shard-id order.
    pub fn shard_addrs(&self) -> Vec<String> {
        parse_addrs(&self.ip_ports)
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        match self.rpc_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn worker_threads(&self) -> usize {
        if self.thread_num > 0 {
            self.thread_num
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Splits a `host:port;host:port` list, dropping empty entries.
pub fn parse_addrs(ip_ports: &str) -> Vec<String> {
    ip_ports
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
