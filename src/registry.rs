use crate::instrument::{Counter, DEFAULT_BUCKETS, Gauge, Histogram, HistogramSnapshot};
use metrics::{Key, KeyName, Label, Metadata, Recorder, SharedString, Unit};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::SystemTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    /// Name used by the text exposition `# TYPE` line.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

#[derive(Debug, Clone)]
struct Description {
    help: SharedString,
    unit: Option<Unit>,
}

/// Label-keyed instrument storage shared by the generator, the exposition
/// endpoint and the exporter.
///
/// A metric name belongs to the first kind registered under it. Later
/// registrations of the name as another kind get a handle that is never
/// exported.
pub struct Registry {
    counters: RwLock<BTreeMap<Key, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<Key, Arc<Gauge>>>,
    histograms: RwLock<BTreeMap<Key, Arc<Histogram>>>,
    kinds: RwLock<HashMap<String, MetricKind>>,
    descriptions: RwLock<HashMap<String, Description>>,
    buckets: Arc<[f64]>,
    start_time: SystemTime,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_buckets(&DEFAULT_BUCKETS)
    }

    /// Create a registry whose histograms use the given sorted upper bounds.
    pub fn with_buckets(buckets: &[f64]) -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
            kinds: RwLock::new(HashMap::new()),
            descriptions: RwLock::new(HashMap::new()),
            buckets: Arc::from(buckets),
            start_time: SystemTime::now(),
        }
    }

    /// When the registry was created; the start of every cumulative series.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Attach help text to a metric name.
    pub fn describe(&self, name: &str, help: impl Into<SharedString>) {
        self.describe_with_unit(name, None, help.into());
    }

    fn describe_with_unit(&self, name: &str, unit: Option<Unit>, help: SharedString) {
        self.descriptions
            .write()
            .insert(name.to_owned(), Description { help, unit });
    }

    /// Get or create the counter series for `key`.
    pub fn counter(&self, key: &Key) -> Arc<Counter> {
        self.get_or_insert(&self.counters, key, MetricKind::Counter, Counter::new)
    }

    /// Get or create the gauge series for `key`.
    pub fn gauge(&self, key: &Key) -> Arc<Gauge> {
        self.get_or_insert(&self.gauges, key, MetricKind::Gauge, Gauge::new)
    }

    /// Get or create the histogram series for `key`.
    pub fn histogram(&self, key: &Key) -> Arc<Histogram> {
        self.get_or_insert(&self.histograms, key, MetricKind::Histogram, || {
            Histogram::new(self.buckets.clone())
        })
    }

    fn get_or_insert<T>(
        &self,
        map: &RwLock<BTreeMap<Key, Arc<T>>>,
        key: &Key,
        kind: MetricKind,
        init: impl FnOnce() -> T,
    ) -> Arc<T> {
        if let Some(existing) = map.read().get(key) {
            return existing.clone();
        }
        if !self.claim(key.name(), kind) {
            tracing::warn!(
                name = key.name(),
                kind = kind.as_str(),
                "metric name registered with another kind; series is not exported"
            );
            return Arc::new(init());
        }
        map.write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(init()))
            .clone()
    }

    /// Whether `name` is, or now becomes, a metric of `kind`.
    fn claim(&self, name: &str, kind: MetricKind) -> bool {
        if let Some(existing) = self.kinds.read().get(name) {
            return *existing == kind;
        }
        *self.kinds.write().entry(name.to_owned()).or_insert(kind) == kind
    }

    /// Copy the state of every series, grouped into families ordered by name.
    pub fn snapshot(&self) -> Snapshot {
        let descriptions = self.descriptions.read();
        let mut families: BTreeMap<String, Family> = BTreeMap::new();

        let mut push = |key: &Key, kind: MetricKind, value: Value| {
            let family = families
                .entry(key.name().to_owned())
                .or_insert_with(|| {
                    let description = descriptions.get(key.name());
                    Family {
                        name: key.name().to_owned(),
                        help: description.map(|d| d.help.to_string()),
                        unit: description.and_then(|d| d.unit),
                        kind,
                        series: Vec::new(),
                    }
                });
            family.series.push(Series {
                labels: key.labels().cloned().collect(),
                value,
            });
        };

        for (key, counter) in self.counters.read().iter() {
            push(key, MetricKind::Counter, Value::Counter(counter.get()));
        }
        for (key, gauge) in self.gauges.read().iter() {
            push(key, MetricKind::Gauge, Value::Gauge(gauge.get()));
        }
        for (key, histogram) in self.histograms.read().iter() {
            push(
                key,
                MetricKind::Histogram,
                Value::Histogram(histogram.snapshot()),
            );
        }

        Snapshot {
            start_time: self.start_time,
            time: SystemTime::now(),
            families: families.into_values().collect(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for Registry {
    fn describe_counter(&self, key: KeyName, unit: Option<Unit>, description: SharedString) {
        self.describe_with_unit(key.as_str(), unit, description);
    }

    fn describe_gauge(&self, key: KeyName, unit: Option<Unit>, description: SharedString) {
        self.describe_with_unit(key.as_str(), unit, description);
    }

    fn describe_histogram(&self, key: KeyName, unit: Option<Unit>, description: SharedString) {
        self.describe_with_unit(key.as_str(), unit, description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> metrics::Counter {
        metrics::Counter::from_arc(self.counter(key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> metrics::Gauge {
        metrics::Gauge::from_arc(self.gauge(key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> metrics::Histogram {
        metrics::Histogram::from_arc(self.histogram(key))
    }
}

/// Point-in-time copy of a [`Registry`].
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub start_time: SystemTime,
    pub time: SystemTime,
    pub families: Vec<Family>,
}

impl Snapshot {
    pub fn family(&self, name: &str) -> Option<&Family> {
        self.families.iter().find(|family| family.name == name)
    }
}

/// All series sharing one metric name.
#[derive(Debug, Clone)]
pub struct Family {
    pub name: String,
    pub help: Option<String>,
    pub unit: Option<Unit>,
    pub kind: MetricKind,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub labels: Vec<Label>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Counter(f64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}
