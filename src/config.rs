//! Compile-time parameters of the load generator.
//!
//! Nothing here is read from flags, files or the environment. The two
//! variants differ only in cardinality and whether the push side is wired up.

use crate::export::ExporterBuilder;
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

pub const HTTP_PORT: u16 = 8080;

pub const LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, HTTP_PORT));

/// Pause between generator iterations.
pub const GENERATOR_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between pushes to the collector.
pub const EXPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-request timeout for pushes, also the bound on the final flush.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(1);

pub const BASIC_CARDINALITY: usize = 1_000;
pub const EXTENDED_CARDINALITY: usize = 10_000;

/// Label shared by all three generated families.
pub const LABEL_NAME: &str = "label";

pub const HISTOGRAM_NAME: &str = "histogram";
pub const COUNTER_NAME: &str = "counter";
pub const GAUGE_NAME: &str = "gauge";

/// One observation per bucket of [`crate::instrument::DEFAULT_BUCKETS`],
/// the last one landing in `+Inf`.
pub const OBSERVATIONS: [f64; 12] = [
    0.001, 0.008, 0.011, 0.03, 0.07, 0.11, 0.3, 0.7, 1.1, 3.0, 7.0, 20.0,
];

pub const COUNTER_INCREMENT: f64 = 0.01;
pub const GAUGE_VALUE: f64 = 0.01;

/// OTLP/gRPC, the collector's default `otlp` receiver port.
pub const OTLP_ENDPOINT: &str = "http://localhost:4317";
pub const REMOTE_WRITE_ENDPOINT: &str = "http://localhost:9090/api/v1/write";

/// Number of label values maintained by each generated family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub histogram: usize,
    pub counter: usize,
    pub gauge: usize,
}

impl Cardinality {
    pub const fn uniform(series: usize) -> Self {
        Self {
            histogram: series,
            counter: series,
            gauge: series,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub interval: Duration,
    pub cardinality: Cardinality,
    /// Push pipeline, `None` to run scrape-only.
    pub export: Option<ExporterBuilder>,
    /// Serve `/memorymetrics`.
    pub memory_endpoint: bool,
}

impl Config {
    /// 10k series per family, OTLP/gRPC push and the memory endpoint.
    pub fn extended() -> Self {
        Self {
            listen: LISTEN_ADDR,
            interval: GENERATOR_INTERVAL,
            cardinality: Cardinality::uniform(EXTENDED_CARDINALITY),
            export: Some(ExporterBuilder::new()),
            memory_endpoint: true,
        }
    }

    /// 1k series per family, scrape only.
    pub fn basic() -> Self {
        Self {
            listen: LISTEN_ADDR,
            interval: GENERATOR_INTERVAL,
            cardinality: Cardinality::uniform(BASIC_CARDINALITY),
            export: None,
            memory_endpoint: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::extended()
    }
}
