//! High-cardinality variant: 10k series per family, OTLP push to a local
//! collector and the `/memorymetrics` endpoint.
//!
//! To test: `curl localhost:8080/metrics`

use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOCATOR: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match metrics_stress::run(metrics_stress::Config::extended()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "fatal");
            ExitCode::FAILURE
        }
    }
}
