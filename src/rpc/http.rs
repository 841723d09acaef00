use super::{RpcRequest, RpcResponse, Transport};
use crate::error::{Error, Result};
use futures::future::BoxFuture;

/// Posts bincode-encoded requests to `http://<addr>/rpc` on each shard.
pub struct HttpTransport {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpTransport {
    /// # Arguments
    ///
    /// * `addrs` - `host:port` of every shard, in shard-id order.
    ///
    /// No deadline is set on the HTTP client; `fan_out` owns the per-call
    /// timeout.
    pub fn new(addrs: &[String]) -> Result<Self> {
        if addrs.is_empty() {
            return Err(Error::config("no shard addresses given"));
        }
        // Shard traffic stays inside the cluster.
        let builder = reqwest::Client::builder().no_proxy();
        let urls = addrs
            .iter()
            .map(|addr| {
                if addr.starts_with("http://") || addr.starts_with("https://") {
                    format!("{}/rpc", addr.trim_end_matches('/'))
                } else {
                    format!("http://{}/rpc", addr)
                }
            })
            .collect();
        Ok(HttpTransport {
            client: builder.build()?,
            urls,
        })
    }

    async fn post(&self, shard: usize, request: RpcRequest) -> Result<RpcResponse> {
        let url = self
            .urls
            .get(shard)
            .ok_or_else(|| Error::rpc(format!("no shard {} in a cluster of {}", shard, self.urls.len())))?;
        let body = bincode::serialize(&request)?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(Error::rpc(format!(
                "shard {} answered {}: {}",
                shard,
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }
        Ok(bincode::deserialize(&bytes)?)
    }
}

impl Transport for HttpTransport {
    fn shard_count(&self) -> usize {
        self.urls.len()
    }

    fn call(&self, shard: usize, request: RpcRequest) -> BoxFuture<'_, Result<RpcResponse>> {
        Box::pin(self.post(shard, request))
    }
}
