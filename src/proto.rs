//! Wire messages for the push protocols.
//!
//! OTLP types and the gRPC client come generated from `opentelemetry-proto`.
//! The remote-write messages are declared with `prost` derives; tags match the
//! upstream `.proto` definitions so receivers decode them unchanged.

/// `opentelemetry.proto.*` messages plus the tonic `MetricsService` client and
/// server.
pub use opentelemetry_proto::tonic as otlp;

/// `prometheus` remote-write 1.0 messages.
pub mod prometheus {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct WriteRequest {
        #[prost(message, repeated, tag = "1")]
        pub timeseries: Vec<TimeSeries>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TimeSeries {
        /// Sorted by name.
        #[prost(message, repeated, tag = "1")]
        pub labels: Vec<Label>,
        #[prost(message, repeated, tag = "2")]
        pub samples: Vec<Sample>,
    }

    #[derive(Clone, PartialEq, Eq, ::prost::Message)]
    pub struct Label {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub value: String,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Sample {
        #[prost(double, tag = "1")]
        pub value: f64,
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }
}
