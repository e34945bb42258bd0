use crate::{
    proto::otlp::{
        collector::metrics::v1::ExportMetricsServiceRequest,
        common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value},
        metrics::v1::{
            AggregationTemporality, Gauge, Histogram, HistogramDataPoint, Metric,
            NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum, metric::Data, number_data_point,
        },
        resource::v1::Resource,
    },
    registry::{Family, MetricKind, Series, Snapshot, Value},
};
use metrics::Unit;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SERVICE_NAME: &str = "metrics-stress";

pub(crate) fn request(snapshot: &Snapshot) -> ExportMetricsServiceRequest {
    let start = unix_nanos(snapshot.start_time);
    let time = unix_nanos(snapshot.time);

    let metrics = snapshot
        .families
        .iter()
        .filter(|family| !family.series.is_empty())
        .map(|family| metric(family, start, time))
        .collect();

    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![string_attribute("service.name", SERVICE_NAME)],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(InstrumentationScope {
                    name: SERVICE_NAME.to_owned(),
                    version: env!("CARGO_PKG_VERSION").to_owned(),
                    ..Default::default()
                }),
                metrics,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn metric(family: &Family, start: u64, time: u64) -> Metric {
    let cumulative = AggregationTemporality::Cumulative as i32;

    let data = match family.kind {
        MetricKind::Counter => Data::Sum(Sum {
            data_points: number_points(&family.series, start, time),
            aggregation_temporality: cumulative,
            is_monotonic: true,
        }),
        MetricKind::Gauge => Data::Gauge(Gauge {
            data_points: number_points(&family.series, start, time),
        }),
        MetricKind::Histogram => Data::Histogram(Histogram {
            data_points: histogram_points(&family.series, start, time),
            aggregation_temporality: cumulative,
        }),
    };

    Metric {
        name: family.name.clone(),
        description: family.help.clone().unwrap_or_default(),
        unit: family.unit.map(ucum).unwrap_or_default().to_owned(),
        data: Some(data),
        ..Default::default()
    }
}

fn number_points(series: &[Series], start: u64, time: u64) -> Vec<NumberDataPoint> {
    series
        .iter()
        .filter_map(|series| {
            let value = match series.value {
                Value::Counter(value) | Value::Gauge(value) => value,
                Value::Histogram(_) => return None,
            };
            Some(NumberDataPoint {
                attributes: attributes(series),
                start_time_unix_nano: start,
                time_unix_nano: time,
                value: Some(number_data_point::Value::AsDouble(value)),
                ..Default::default()
            })
        })
        .collect()
}

fn histogram_points(series: &[Series], start: u64, time: u64) -> Vec<HistogramDataPoint> {
    series
        .iter()
        .filter_map(|series| match &series.value {
            Value::Histogram(histogram) => Some(HistogramDataPoint {
                attributes: attributes(series),
                start_time_unix_nano: start,
                time_unix_nano: time,
                count: histogram.count(),
                sum: Some(histogram.sum),
                bucket_counts: histogram.counts.clone(),
                explicit_bounds: histogram.bounds.to_vec(),
                ..Default::default()
            }),
            _ => None,
        })
        .collect()
}

fn attributes(series: &Series) -> Vec<KeyValue> {
    series
        .labels
        .iter()
        .map(|label| string_attribute(label.key(), label.value()))
        .collect()
}

fn string_attribute(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_owned())),
        }),
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

/// UCUM spelling of a unit.
fn ucum(unit: Unit) -> &'static str {
    match unit {
        Unit::Count => "1",
        Unit::Percent => "%",
        Unit::Seconds => "s",
        Unit::Milliseconds => "ms",
        Unit::Microseconds => "us",
        Unit::Nanoseconds => "ns",
        Unit::Bytes => "By",
        Unit::Kibibytes => "KiBy",
        Unit::Mebibytes => "MiBy",
        Unit::Gibibytes => "GiBy",
        Unit::Tebibytes => "TiBy",
        Unit::BitsPerSecond => "bit/s",
        Unit::KilobitsPerSecond => "kbit/s",
        Unit::MegabitsPerSecond => "Mbit/s",
        Unit::GigabitsPerSecond => "Gbit/s",
        Unit::TerabitsPerSecond => "Tbit/s",
        Unit::CountPerSecond => "1/s",
        #[allow(unreachable_patterns)]
        _ => "",
    }
}
