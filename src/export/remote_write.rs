use crate::{
    error::Result,
    proto::prometheus::{Label, Sample, TimeSeries, WriteRequest},
    registry::{Series, Snapshot, Value},
    text::format_value,
};
use prost::Message;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let write_request = request(snapshot);
    Ok(snap::raw::Encoder::new().compress_vec(&write_request.encode_to_vec())?)
}

/// Histograms are expanded the way the text format lays them out: one
/// `_bucket` series per bound plus `_sum` and `_count`.
pub(crate) fn request(snapshot: &Snapshot) -> WriteRequest {
    let timestamp = timestamp_millis(snapshot.time);
    let mut timeseries = vec![];

    for family in &snapshot.families {
        for series in &family.series {
            match &series.value {
                Value::Counter(value) | Value::Gauge(value) => {
                    timeseries.push(timeseries_for(&family.name, series, None, *value, timestamp));
                }
                Value::Histogram(histogram) => {
                    let bucket = format!("{}_bucket", family.name);
                    let bounds = histogram.bounds.iter().map(|bound| format_value(*bound));
                    let bounds = bounds.chain(std::iter::once("+Inf".to_owned()));
                    for (le, count) in bounds.zip(histogram.cumulative()) {
                        timeseries.push(timeseries_for(
                            &bucket,
                            series,
                            Some(le),
                            count as f64,
                            timestamp,
                        ));
                    }
                    timeseries.push(timeseries_for(
                        &format!("{}_sum", family.name),
                        series,
                        None,
                        histogram.sum,
                        timestamp,
                    ));
                    timeseries.push(timeseries_for(
                        &format!("{}_count", family.name),
                        series,
                        None,
                        histogram.count() as f64,
                        timestamp,
                    ));
                }
            }
        }
    }

    WriteRequest { timeseries }
}

fn timeseries_for(
    name: &str,
    series: &Series,
    le: Option<String>,
    value: f64,
    timestamp: i64,
) -> TimeSeries {
    let mut labels = vec![Label {
        name: "__name__".to_owned(),
        value: name.to_owned(),
    }];

    for label in &series.labels {
        labels.push(Label {
            name: label.key().to_string(),
            value: label.value().to_string(),
        })
    }

    if let Some(le) = le {
        labels.push(Label {
            name: "le".to_owned(),
            value: le,
        });
    }

    labels.sort_by(|a, b| a.name.cmp(&b.name));

    TimeSeries {
        labels,
        samples: vec![Sample { value, timestamp }],
    }
}

fn timestamp_millis(timestamp: SystemTime) -> i64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
