use super::{RpcRequest, RpcResponse};
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

/// The opaque request/response primitive between a client and its shards.
///
/// One call is one attempt; retries are the caller's business.
pub trait Transport: Send + Sync {
    fn shard_count(&self) -> usize;

    fn call(&self, shard: usize, request: RpcRequest) -> BoxFuture<'_, Result<RpcResponse>>;
}

/// Anything that answers shard RPCs.
pub trait RpcHandler: Send + Sync {
    fn handle(&self, request: RpcRequest) -> Result<RpcResponse>;
}

/// Calls in-process handlers directly.
///
/// Requests and responses still go through the wire codec, so a cluster
/// built this way sees exactly the payloads an HTTP cluster would.
pub struct InProcessTransport {
    shards: Vec<Arc<dyn RpcHandler>>,
}

impl InProcessTransport {
    pub fn new(shards: Vec<Arc<dyn RpcHandler>>) -> Self {
        InProcessTransport { shards }
    }
}

impl Transport for InProcessTransport {
    fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn call(&self, shard: usize, request: RpcRequest) -> BoxFuture<'_, Result<RpcResponse>> {
        Box::pin(async move {
            let handler = self
                .shards
                .get(shard)
                .ok_or_else(|| Error::rpc(format!("no shard {} in a cluster of {}", shard, self.shards.len())))?;
            let request: RpcRequest = bincode::deserialize(&bincode::serialize(&request)?)?;
            let response = handler
                .handle(request)
                .map_err(|e| Error::rpc(format!("shard {}: {}", shard, e)))?;
            Ok(bincode::deserialize(&bincode::serialize(&response)?)?)
        })
    }
}
