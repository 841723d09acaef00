use thiserror::Error;

/// Errors raised while building or querying the graph engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad shard count, bad cache threshold, unknown strategy id and the like.
    #[error("config error: {0}")]
    Config(String),

    /// Missing contexts, non-positive weights, unknown namespaces.
    #[error("data error: {0}")]
    Data(String),

    /// A shard RPC failed, timed out or answered with a malformed payload.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A sampling table would exceed its hard size limit.
    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("ranged draw is not supported by the {0} sampling kernel")]
    RangeUnsupported(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub(crate) fn rpc(msg: impl Into<String>) -> Self {
        Error::Rpc(msg.into())
    }
}
