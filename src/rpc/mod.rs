//! Request/response types for every shard RPC and the fan-out primitive.
//!
//! Each op has a request struct and a response struct. [`RpcCall`] ties the
//! two together so the dispatch layer stays typed end to end.

mod http;
mod transport;

pub use http::HttpTransport;
pub use transport::{InProcessTransport, RpcHandler, Transport};

use crate::error::{Error, Result};
use crate::node::{Context, Feature, NodeId, WalkerInfo};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

/// Meta key: comma-joined per-namespace total node frequency of a shard.
pub const META_NODE_FREQ: &str = "__RPC_NAME_NODE_FREQ__";
/// Meta key: the shard's page size for paginated scans.
pub const META_MAX_NODE_PER_RPC: &str = "__RPC_NAME_MAX_NODE_PER_RPC__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaLookupRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaLookupResponse {
    pub value: String,
}

/// Shared by both negative sampling RPCs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeSampleRequest {
    pub count: usize,
    pub nodes: Vec<NodeId>,
    pub excluded_nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeSampleResponse {
    /// Indexed by namespace (shared) or by input position (independent).
    pub sampled_nodes_list: Vec<Vec<NodeId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSampleRequest {
    pub count: i32,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSampleResponse {
    pub neighbor_nodes_list: Vec<Vec<NodeId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkRequest {
    pub cur_nodes: Vec<NodeId>,
    /// Hops still wanted per walk.
    pub walk_lens: Vec<usize>,
    /// Hops already taken per walk, for meta-path phase. May be empty.
    pub offsets: Vec<usize>,
    pub walker_info: WalkerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkResponse {
    pub seqs: Vec<Vec<NodeId>>,
}

/// Node list shared by the feature and context lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodesRequest {
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResponse {
    pub node_feats: Vec<Feature>,
    pub neigh_feats: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFeatureResponse {
    pub node_feats: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborFeatureResponse {
    pub neigh_feats: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResponse {
    pub contexts: Vec<Context>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheNodeRequest {
    pub cursor: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheNodeResponse {
    pub nodes: Vec<NodeId>,
}

/// Every request a shard answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    MetaLookup(MetaLookupRequest),
    SharedNegativeSample(NegativeSampleRequest),
    IndepNegativeSample(NegativeSampleRequest),
    RandomNeighborSample(NeighborSampleRequest),
    StaticRandomWalk(RandomWalkRequest),
    LookupFeature(NodesRequest),
    LookupNodeFeature(NodesRequest),
    LookupNeighborFeature(NodesRequest),
    LookupContext(NodesRequest),
    CacheNodeLookup(CacheNodeRequest),
}

impl RpcRequest {
    pub fn name(&self) -> &'static str {
        match self {
            RpcRequest::MetaLookup(_) => "MetaLookuper",
            RpcRequest::SharedNegativeSample(_) => "SharedNegativeSampler",
            RpcRequest::IndepNegativeSample(_) => "IndepNegativeSampler",
            RpcRequest::RandomNeighborSample(_) => "RandomNeighborSampler",
            RpcRequest::StaticRandomWalk(_) => "StaticRandomWalker",
            RpcRequest::LookupFeature(_) => "FeatureLookuper",
            RpcRequest::LookupNodeFeature(_) => "NodeFeatureLookuper",
            RpcRequest::LookupNeighborFeature(_) => "NeighborFeatureLookuper",
            RpcRequest::LookupContext(_) => "ContextLookuper",
            RpcRequest::CacheNodeLookup(_) => "CacheNodeLookuper",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    MetaLookup(MetaLookupResponse),
    NegativeSample(NegativeSampleResponse),
    RandomNeighborSample(NeighborSampleResponse),
    StaticRandomWalk(RandomWalkResponse),
    LookupFeature(FeatureResponse),
    LookupNodeFeature(NodeFeatureResponse),
    LookupNeighborFeature(NeighborFeatureResponse),
    LookupContext(ContextResponse),
    CacheNodeLookup(CacheNodeResponse),
}

/// One typed request/response pair.
pub trait RpcCall: Send + Sized {
    type Response: Send;

    fn into_request(self) -> RpcRequest;

    fn from_response(response: RpcResponse) -> Result<Self::Response>;
}

macro_rules! rpc_call {
    ($call:ident, $req:ident => $resp_variant:ident($resp:ident)) => {
        #[doc = concat!("Typed `", stringify!($req), "` call.")]
        #[derive(Debug, Clone, PartialEq)]
        pub struct $call(pub $req);

        impl RpcCall for $call {
            type Response = $resp;

            fn into_request(self) -> RpcRequest {
                RpcRequest::$call(self.0)
            }

            fn from_response(response: RpcResponse) -> Result<$resp> {
                match response {
                    RpcResponse::$resp_variant(inner) => Ok(inner),
                    other => Err(Error::rpc(format!(
                        "{} got a mismatched response: {:?}",
                        stringify!($call),
                        other
                    ))),
                }
            }
        }
    };
}

rpc_call!(MetaLookup, MetaLookupRequest => MetaLookup(MetaLookupResponse));
rpc_call!(SharedNegativeSample, NegativeSampleRequest => NegativeSample(NegativeSampleResponse));
rpc_call!(IndepNegativeSample, NegativeSampleRequest => NegativeSample(NegativeSampleResponse));
rpc_call!(RandomNeighborSample, NeighborSampleRequest => RandomNeighborSample(NeighborSampleResponse));
rpc_call!(StaticRandomWalk, RandomWalkRequest => StaticRandomWalk(RandomWalkResponse));
rpc_call!(LookupFeature, NodesRequest => LookupFeature(FeatureResponse));
rpc_call!(LookupNodeFeature, NodesRequest => LookupNodeFeature(NodeFeatureResponse));
rpc_call!(LookupNeighborFeature, NodesRequest => LookupNeighborFeature(NeighborFeatureResponse));
rpc_call!(LookupContext, NodesRequest => LookupContext(ContextResponse));
rpc_call!(CacheNodeLookup, CacheNodeRequest => CacheNodeLookup(CacheNodeResponse));

/// Sends `requests[shard]` to every shard that has one and waits for all of
/// them.
///
/// `None` entries are skipped and stay `None` in the output. Any failed or
/// timed-out call fails the whole fan-out; no partial results are returned.
pub async fn fan_out<C: RpcCall>(
    transport: &dyn Transport,
    requests: Vec<Option<C>>,
    timeout: Option<Duration>,
) -> Result<Vec<Option<C::Response>>> {
    if requests.len() != transport.shard_count() {
        return Err(Error::rpc(format!(
            "{} requests for {} shards",
            requests.len(),
            transport.shard_count()
        )));
    }

    let calls = requests.into_iter().enumerate().map(|(shard, request)| async move {
        let Some(request) = request else {
            return Ok(None);
        };
        let request = request.into_request();
        let name = request.name();
        let call = transport.call(shard, request);
        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(response) => response,
                Err(_) => Err(Error::rpc(format!("shard {} timed out after {:?}", shard, limit))),
            },
            None => call.await,
        };
        match response.and_then(C::from_response) {
            Ok(response) => Ok(Some(response)),
            Err(e) => {
                error!("{} on shard {} failed: {}", name, shard, e);
                Err(e)
            }
        }
    });

    join_all(calls).await.into_iter().collect()
}

/// Sends the same request to every shard.
pub async fn broadcast<C: RpcCall + Clone>(
    transport: &dyn Transport,
    request: C,
    timeout: Option<Duration>,
) -> Result<Vec<C::Response>> {
    let requests = vec![Some(request); transport.shard_count()];
    let responses = fan_out(transport, requests, timeout).await?;
    responses
        .into_iter()
        .enumerate()
        .map(|(shard, r)| r.ok_or_else(|| Error::rpc(format!("shard {} did not answer", shard))))
        .collect()
}
