//! Synthetic workload: rewrites every generated series once per interval.

use crate::{
    config::{
        COUNTER_INCREMENT, COUNTER_NAME, Cardinality, GAUGE_NAME, GAUGE_VALUE, HISTOGRAM_NAME,
        LABEL_NAME, OBSERVATIONS,
    },
    error::{Error, Result},
    instrument::{Counter, Gauge, Histogram},
    registry::Registry,
};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use metrics::{Key, Label};
use std::{sync::Arc, thread::JoinHandle, time::Duration};

/// Pre-resolved handles for every generated series.
///
/// All label values are registered up front, so the set of series never
/// changes once the generator exists.
pub struct Generator {
    histograms: Vec<Arc<Histogram>>,
    counters: Vec<Arc<Counter>>,
    gauges: Vec<Arc<Gauge>>,
    iterations: u64,
}

impl Generator {
    pub fn new(registry: &Registry, cardinality: Cardinality) -> Self {
        registry.describe(HISTOGRAM_NAME, "A histogram");
        registry.describe(COUNTER_NAME, "A counter");
        registry.describe(GAUGE_NAME, "A gauge");

        Self {
            histograms: (0..cardinality.histogram)
                .map(|i| registry.histogram(&series_key(HISTOGRAM_NAME, i)))
                .collect(),
            counters: (0..cardinality.counter)
                .map(|i| registry.counter(&series_key(COUNTER_NAME, i)))
                .collect(),
            gauges: (0..cardinality.gauge)
                .map(|i| registry.gauge(&series_key(GAUGE_NAME, i)))
                .collect(),
            iterations: 0,
        }
    }

    /// Apply one full batch of updates.
    pub fn step(&mut self) {
        for histogram in &self.histograms {
            for value in OBSERVATIONS {
                histogram.observe(value);
            }
        }
        for counter in &self.counters {
            counter.add(COUNTER_INCREMENT);
        }
        for gauge in &self.gauges {
            gauge.set(GAUGE_VALUE);
        }
        self.iterations += 1;
    }

    /// Completed iterations.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Step, then wait `interval`, until `shutdown` fires or disconnects.
    pub fn run(mut self, interval: Duration, shutdown: Receiver<()>) {
        tracing::info!(
            histograms = self.histograms.len(),
            counters = self.counters.len(),
            gauges = self.gauges.len(),
            ?interval,
            "generator started"
        );

        loop {
            self.step();
            tracing::trace!(iteration = self.iterations, "generator iteration complete");

            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!(iterations = self.iterations, "generator stopped");
    }

    /// Run on a background thread.
    pub fn spawn(self, interval: Duration) -> Result<GeneratorHandle> {
        let (tx_shutdown, rx_shutdown) = crossbeam::channel::bounded(1);

        let worker = std::thread::Builder::new()
            .name("generator".to_owned())
            .spawn(move || self.run(interval, rx_shutdown))
            .map_err(|source| Error::Spawn {
                name: "generator",
                source,
            })?;

        Ok(GeneratorHandle {
            tx_shutdown,
            worker,
        })
    }
}

/// Label value is the plain decimal index.
fn series_key(name: &'static str, index: usize) -> Key {
    Key::from_parts(name, vec![Label::new(LABEL_NAME, index.to_string())])
}

pub struct GeneratorHandle {
    tx_shutdown: Sender<()>,
    worker: JoinHandle<()>,
}

impl GeneratorHandle {
    /// Stop after the current iteration and wait for the thread.
    pub fn shutdown(self) {
        self.tx_shutdown.send(()).ok();
        if self.worker.join().is_err() {
            tracing::error!("generator thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Value;

    #[test]
    fn registers_every_series_up_front() {
        let registry = Registry::new();
        let _generator = Generator::new(
            &registry,
            Cardinality {
                histogram: 3,
                counter: 5,
                gauge: 7,
            },
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.family(HISTOGRAM_NAME).unwrap().series.len(), 3);
        assert_eq!(snapshot.family(COUNTER_NAME).unwrap().series.len(), 5);
        assert_eq!(snapshot.family(GAUGE_NAME).unwrap().series.len(), 7);
    }

    #[test]
    fn label_values_are_decimal() {
        let key = series_key(COUNTER_NAME, 1042);
        let label = key.labels().next().unwrap();
        assert_eq!(label.key(), "label");
        assert_eq!(label.value(), "1042");
    }

    #[test]
    fn step_updates_all_families() {
        let registry = Registry::new();
        let mut generator = Generator::new(&registry, Cardinality::uniform(2));
        generator.step();
        generator.step();
        assert_eq!(generator.iterations(), 2);

        let snapshot = registry.snapshot();
        for series in &snapshot.family(COUNTER_NAME).unwrap().series {
            assert_eq!(series.value, Value::Counter(0.02));
        }
        for series in &snapshot.family(GAUGE_NAME).unwrap().series {
            assert_eq!(series.value, Value::Gauge(0.01));
        }
        for series in &snapshot.family(HISTOGRAM_NAME).unwrap().series {
            match &series.value {
                Value::Histogram(histogram) => {
                    assert_eq!(histogram.count(), 24);
                    assert!(histogram.counts.iter().all(|count| *count == 2));
                }
                other => panic!("unexpected value {other:?}"),
            }
        }
    }

    #[test]
    fn spawned_generator_stops_on_shutdown() {
        let registry = Registry::new();
        let generator = Generator::new(&registry, Cardinality::uniform(1));
        let counter = registry.counter(&series_key(COUNTER_NAME, 0));

        let handle = generator.spawn(Duration::from_secs(3600)).unwrap();
        handle.shutdown();

        // exactly the first iteration ran before the long wait was cut short
        assert_eq!(counter.get(), 0.01);
    }
}
