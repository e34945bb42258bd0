//! Minimal allocator statistics for measuring the generator's own footprint.
//!
//! Kept in a registry of its own so the main exposition stays free of
//! process series.

use crate::{
    error::{Error, Result},
    registry::Registry,
};

pub const MEMORY_TOTAL_BYTES: &str = "process_memory_classes_total_bytes";

/// Refresh the memory gauge in `registry` from the allocator.
pub fn refresh(registry: &Registry) -> Result<()> {
    let mapped = mapped_bytes()?;

    metrics::with_local_recorder(registry, || {
        metrics::describe_gauge!(
            MEMORY_TOTAL_BYTES,
            metrics::Unit::Bytes,
            "All memory mapped by the allocator into the current process."
        );
        metrics::gauge!(MEMORY_TOTAL_BYTES).set(mapped as f64);
    });

    Ok(())
}

#[cfg(not(target_env = "msvc"))]
fn mapped_bytes() -> Result<u64> {
    use tikv_jemalloc_ctl::{epoch, stats};

    // statistics are cached until the epoch advances
    epoch::advance().map_err(|err| Error::Memory(err.to_string()))?;
    stats::mapped::read()
        .map(|bytes| bytes as u64)
        .map_err(|err| Error::Memory(err.to_string()))
}

#[cfg(target_env = "msvc")]
fn mapped_bytes() -> Result<u64> {
    Err(Error::Memory("jemalloc is not available on msvc".to_owned()))
}

#[cfg(all(test, not(target_env = "msvc")))]
mod tests {
    use super::*;
    use crate::registry::{MetricKind, Value};

    #[test]
    fn refresh_populates_single_gauge() {
        let registry = Registry::new();
        refresh(&registry).unwrap();
        refresh(&registry).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.families.len(), 1);

        let family = &snapshot.families[0];
        assert_eq!(family.name, MEMORY_TOTAL_BYTES);
        assert_eq!(family.kind, MetricKind::Gauge);
        assert_eq!(family.unit, Some(metrics::Unit::Bytes));
        assert_eq!(family.series.len(), 1);
        assert!(matches!(family.series[0].value, Value::Gauge(bytes) if bytes >= 0.0));
    }
}
