//! One graph shard behind an HTTP endpoint.
//!
//! `POST /rpc` takes a bincode [`RpcRequest`] body and answers with a
//! bincode [`RpcResponse`]; any failure is a 500 carrying the error text.

use crate::config::GraphConfig;
use crate::error::Result;
use crate::ops::LocalOps;
use crate::rpc::{
    CacheNodeResponse, ContextResponse, FeatureResponse, MetaLookupResponse, NegativeSampleResponse,
    NeighborFeatureResponse, NeighborSampleResponse, NodeFeatureResponse, RandomWalkResponse,
    RpcHandler, RpcRequest, RpcResponse,
};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Answers shard RPCs against one partition.
pub struct GraphService {
    ops: LocalOps,
}

impl GraphService {
    pub fn new(ops: LocalOps) -> Self {
        GraphService { ops }
    }

    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        Ok(GraphService::new(LocalOps::from_config(config)?))
    }

    pub fn ops(&self) -> &LocalOps {
        &self.ops
    }
}

impl RpcHandler for GraphService {
    fn handle(&self, request: RpcRequest) -> Result<RpcResponse> {
        let ops = &self.ops;
        let response = match request {
            RpcRequest::MetaLookup(req) => RpcResponse::MetaLookup(MetaLookupResponse {
                value: ops.meta_lookup(&req.key)?,
            }),
            RpcRequest::SharedNegativeSample(req) => {
                RpcResponse::NegativeSample(NegativeSampleResponse {
                    sampled_nodes_list: ops.shared_sample_negative(
                        req.count,
                        &req.nodes,
                        &req.excluded_nodes,
                    )?,
                })
            }
            RpcRequest::IndepNegativeSample(req) => {
                RpcResponse::NegativeSample(NegativeSampleResponse {
                    sampled_nodes_list: ops.indep_sample_negative(
                        req.count,
                        &req.nodes,
                        &req.excluded_nodes,
                    )?,
                })
            }
            // A shard sees a slice of the batch; the all-missing check is
            // the client's once every slice is back.
            RpcRequest::RandomNeighborSample(req) => {
                RpcResponse::RandomNeighborSample(NeighborSampleResponse {
                    neighbor_nodes_list: ops.sample_neighbor_partial(req.count, &req.nodes),
                })
            }
            RpcRequest::StaticRandomWalk(req) => RpcResponse::StaticRandomWalk(RandomWalkResponse {
                seqs: ops.traverse(&req.cur_nodes, &req.walk_lens, &req.offsets, &req.walker_info)?,
            }),
            RpcRequest::LookupFeature(req) => {
                let (node_feats, neigh_feats) = ops.lookup_feature(&req.nodes);
                RpcResponse::LookupFeature(FeatureResponse {
                    node_feats,
                    neigh_feats,
                })
            }
            RpcRequest::LookupNodeFeature(req) => RpcResponse::LookupNodeFeature(NodeFeatureResponse {
                node_feats: ops.lookup_node_feature(&req.nodes),
            }),
            RpcRequest::LookupNeighborFeature(req) => {
                RpcResponse::LookupNeighborFeature(NeighborFeatureResponse {
                    neigh_feats: ops.lookup_neighbor_feature(&req.nodes),
                })
            }
            RpcRequest::LookupContext(req) => RpcResponse::LookupContext(ContextResponse {
                contexts: ops.lookup_context_partial(&req.nodes),
            }),
            RpcRequest::CacheNodeLookup(req) => RpcResponse::CacheNodeLookup(CacheNodeResponse {
                nodes: ops.cache_node_lookup(req.cursor, req.count)?,
            }),
        };
        Ok(response)
    }
}

/// Routes of one shard.
pub fn router(service: Arc<GraphService>) -> Router {
    Router::new()
        .route("/rpc", post(post_rpc))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(service)
}

/// Loads the partition of `config.shard_id` and serves it on
/// `ip_ports[shard_id]` until the listener fails.
pub async fn serve(config: GraphConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addrs = config.shard_addrs();
    let addr: SocketAddr = addrs
        .get(config.shard_id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no address for shard {} in ip_ports ({} given)",
                config.shard_id,
                addrs.len()
            )
        })?
        .parse()?;

    info!("loading shard {}/{}", config.shard_id, config.shard_num);
    let service = tokio::task::spawn_blocking(move || GraphService::from_config(&config)).await??;
    let app = router(Arc::new(service));

    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Handler for POST /rpc
async fn post_rpc(State(service): State<Arc<GraphService>>, body: Bytes) -> impl IntoResponse {
    let request: RpcRequest = match bincode::deserialize(&body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("bad request body: {}", e).into_bytes()),
    };
    let name = request.name();
    // Sampler and walker calls are CPU-bound.
    let handled = tokio::task::spawn_blocking(move || service.handle(request)).await;
    let encoded = match handled {
        Ok(Ok(response)) => bincode::serialize(&response).map_err(|e| e.to_string()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("handler panicked: {}", e)),
    };
    match encoded {
        Ok(bytes) => (StatusCode::OK, bytes),
        Err(e) => {
            error!("{} failed: {}", name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.into_bytes())
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
