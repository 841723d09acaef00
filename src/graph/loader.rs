use super::{InMemoryGraph, NamespaceTable};
use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::shard::shard_of;
use std::path::Path;
use tracing::info;

/// Parses one `node id:value id:value ...` line.
///
/// Returns `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<(NodeId, Vec<(u64, f32)>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace();
    let node = match tokens.next().map(str::parse::<NodeId>) {
        Some(Ok(node)) => node,
        _ => return Err(Error::data(format!("bad node id in line `{}`", line))),
    };
    let mut pairs = Vec::new();
    for token in tokens {
        let parsed = token
            .split_once(':')
            .and_then(|(id, value)| Some((id.parse::<u64>().ok()?, value.parse::<f32>().ok()?)));
        match parsed {
            Some(pair) => pairs.push(pair),
            None => {
                return Err(Error::data(format!(
                    "bad `id:value` token `{}` for node {}",
                    token, node
                )))
            }
        }
    }
    Ok(Some((node, pairs)))
}

/// Reads every line of `path` this shard owns.
fn read_owned(
    path: &Path,
    config: &GraphConfig,
    mut sink: impl FnMut(NodeId, Vec<(u64, f32)>),
) -> Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let mut kept = 0;
    for line in text.lines() {
        if let Some((node, pairs)) = parse_line(line)? {
            if shard_of(node, config.shard_num)? == config.shard_id {
                sink(node, pairs);
                kept += 1;
            }
        }
    }
    Ok(kept)
}

impl InMemoryGraph {
    /// Loads this shard's partition of the files named in `config`.
    pub fn load(config: &GraphConfig) -> Result<Self> {
        let namespaces = NamespaceTable::load(config.node_config.as_deref())?;
        let mut builder = InMemoryGraph::builder(namespaces);

        if let Some(path) = &config.node_graph {
            let kept = read_owned(path, config, |node, context| {
                builder.add_context(node, context);
            })?;
            info!("loaded {} contexts from {}", kept, path.display());
        }
        if let Some(path) = &config.node_feature {
            let kept = read_owned(path, config, |node, feature| {
                builder.add_node_feature(node, feature);
            })?;
            info!("loaded {} node features from {}", kept, path.display());
        }
        if let Some(path) = &config.neighbor_feature {
            let kept = read_owned(path, config, |node, feature| {
                builder.add_neighbor_feature(node, feature);
            })?;
            info!("loaded {} neighbor features from {}", kept, path.display());
        }

        builder.build()
    }
}
