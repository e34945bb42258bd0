use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Conventional latency bucket upper bounds, in seconds. `+Inf` is implicit.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// An `f64` stored as its bit pattern.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Monotonically non-decreasing accumulator.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicF64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the counter. Negative and NaN values are dropped.
    pub fn add(&self, value: f64) {
        if !(value >= 0.0) {
            return;
        }
        self.value.update(|current| current + value);
    }

    /// Raise the counter to `value` if it is currently lower.
    pub fn absolute(&self, value: f64) {
        self.value.update(|current| current.max(value));
    }

    pub fn get(&self) -> f64 {
        self.value.load()
    }
}

impl metrics::CounterFn for Counter {
    fn increment(&self, value: u64) {
        self.add(value as f64);
    }

    fn absolute(&self, value: u64) {
        Counter::absolute(self, value as f64);
    }
}

/// Last-set instantaneous value.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicF64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.value.store(value);
    }

    pub fn add(&self, value: f64) {
        self.value.update(|current| current + value);
    }

    pub fn get(&self) -> f64 {
        self.value.load()
    }
}

impl metrics::GaugeFn for Gauge {
    fn increment(&self, value: f64) {
        self.add(value);
    }

    fn decrement(&self, value: f64) {
        self.add(-value);
    }

    fn set(&self, value: f64) {
        Gauge::set(self, value);
    }
}

/// Count distribution over fixed upper bounds plus a running sum.
#[derive(Debug)]
pub struct Histogram {
    bounds: Arc<[f64]>,
    // one slot per bound plus the trailing +Inf bucket, not cumulative
    buckets: Box<[AtomicU64]>,
    sum: AtomicF64,
}

impl Histogram {
    /// Create a histogram over sorted upper bounds.
    pub fn new(bounds: Arc<[f64]>) -> Self {
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum: AtomicF64::default(),
        }
    }

    /// Record one observation in the first bucket whose bound is `>= value`.
    pub fn observe(&self, value: f64) {
        let index = if value.is_nan() {
            self.bounds.len()
        } else {
            self.bounds.partition_point(|bound| *bound < value)
        };
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.sum.update(|current| current + value);
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Copy the current state.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds: self.bounds.clone(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            sum: self.sum.load(),
        }
    }
}

impl metrics::HistogramFn for Histogram {
    fn record(&self, value: f64) {
        self.observe(value);
    }
}

/// Point-in-time copy of a [`Histogram`].
///
/// The total count is derived from the bucket counts, so the `+Inf` cumulative
/// bucket always equals [`HistogramSnapshot::count`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub bounds: Arc<[f64]>,
    /// Per-bucket counts, `bounds.len() + 1` entries, the last being `+Inf`.
    pub counts: Vec<u64>,
    pub sum: f64,
}

impl HistogramSnapshot {
    pub fn count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Running totals per bucket, ending with the `+Inf` bucket.
    pub fn cumulative(&self) -> impl Iterator<Item = u64> + '_ {
        self.counts.iter().scan(0, |total, count| {
            *total += count;
            Some(*total)
        })
    }
}
