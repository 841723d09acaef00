use crate::config::CacheKind;
use crate::error::{Error, Result};
use crate::graph::InMemoryGraph;
use crate::node::NodeId;
use crate::parallel::{chunk_len, thread_pool};
use rand::Rng;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

/// Picks the nodes whose context and features clients should prefetch.
///
/// * `Random`: each key independently with probability `thld`.
/// * `Degree`: the top `thld * N` keys by out-degree, ties in key order.
/// * `Importance`: keys with `(in + 1) / (out + 1) > thld`.
///
/// A threshold of 0 disables caching and returns no nodes.
pub fn select_cache_nodes(
    graph: &InMemoryGraph,
    kind: CacheKind,
    thld: f64,
    threads: usize,
) -> Result<Vec<NodeId>> {
    if !(thld >= 0.0) {
        return Err(Error::config(format!("cache threshold must be >= 0, got {}", thld)));
    }
    if thld == 0.0 {
        info!("cache threshold is 0, caching disabled");
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let keys = graph.keys();
    let pool = thread_pool(threads)?;
    let chunk = chunk_len(keys.len(), pool.current_num_threads());

    let nodes: Vec<NodeId> = match kind {
        CacheKind::Random => {
            if (keys.len() as f64) * thld < 1.0 {
                return Err(Error::config(format!(
                    "random cache threshold {} selects nothing from {} nodes",
                    thld,
                    keys.len()
                )));
            }
            pool.install(|| {
                keys.par_chunks(chunk)
                    .flat_map_iter(|slice| {
                        let mut rng = rand::rng();
                        slice
                            .iter()
                            .copied()
                            .filter(|_| rng.random::<f64>() < thld)
                            .collect::<Vec<_>>()
                    })
                    .collect()
            })
        }
        CacheKind::Degree => {
            let count = ((keys.len() as f64) * thld) as usize;
            if count < 1 {
                return Err(Error::config(format!(
                    "degree cache threshold {} selects nothing from {} nodes",
                    thld,
                    keys.len()
                )));
            }
            let mut ranked: Vec<(NodeId, usize)> = keys
                .iter()
                .map(|&node| (node, graph.out_degree(node)))
                .collect();
            // Stable, so equal degrees keep key order.
            pool.install(|| ranked.par_sort_by(|a, b| b.1.cmp(&a.1)));
            ranked.into_iter().take(count).map(|p| p.0).collect()
        }
        CacheKind::Importance => pool.install(|| {
            keys.par_chunks(chunk)
                .flat_map_iter(|slice| {
                    slice
                        .iter()
                        .copied()
                        .filter(|&node| {
                            let ratio = (graph.in_degree(node) as f64 + 1.0)
                                / (graph.out_degree(node) as f64 + 1.0);
                            ratio > thld
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        }),
    };

    info!(
        "selected {} of {} nodes for caching by {:?} in {:?}",
        nodes.len(),
        keys.len(),
        kind,
        start.elapsed()
    );
    Ok(nodes)
}
