use std::{io, net::SocketAddr};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid export endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("export collector {endpoint} is unreachable: {source}")]
    CollectorUnreachable {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("export to {endpoint} failed: {source}")]
    Export {
        endpoint: String,
        #[source]
        source: Box<tonic::Status>,
    },

    #[error("push to {endpoint} failed: {source}")]
    Push {
        endpoint: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("collector {endpoint} rejected push with status {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("snappy compression failed: {0}")]
    Compress(#[from] snap::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("http server failed: {0}")]
    Serve(#[source] io::Error),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("allocator statistics unavailable: {0}")]
    Memory(String),

    #[cfg(unix)]
    #[error("profiling failed: {0}")]
    Profile(#[from] pprof::Error),
}
