//! On-demand CPU profiling, as a pprof protobuf or a flamegraph.

use crate::error::Result;
use pprof::{Report, protos::Message};
use std::time::Duration;

/// Samples per second.
const FREQUENCY: i32 = 100;

pub const DEFAULT_SECONDS: u64 = 30;
pub const MAX_SECONDS: u64 = 60;

/// Sample every thread for `duration` and return a `profile.proto` encoding,
/// readable by `go tool pprof`.
pub fn pprof(duration: Duration) -> Result<Vec<u8>> {
    let profile = sample(duration)?.pprof()?;
    Ok(profile.encode_to_vec())
}

/// Sample every thread for `duration` and return an SVG flamegraph.
pub fn flamegraph(duration: Duration) -> Result<Vec<u8>> {
    let report = sample(duration)?;
    let mut svg = Vec::new();
    report.flamegraph(&mut svg)?;
    Ok(svg)
}

/// Blocks the calling thread for the whole duration. Only one profile can run
/// at a time; a concurrent call fails.
fn sample(duration: Duration) -> Result<Report> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(FREQUENCY)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()?;

    std::thread::sleep(duration);

    Ok(guard.report().build()?)
}
