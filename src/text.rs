//! Prometheus text exposition format, version 0.0.4.
//!
//! ```text
//! # HELP histogram A histogram
//! # TYPE histogram histogram
//! histogram_bucket{label="0",le="0.005"} 1
//! histogram_bucket{label="0",le="+Inf"} 12
//! histogram_sum{label="0"} 32.33
//! histogram_count{label="0"} 12
//! ```

use crate::registry::{Family, Registry, Series, Snapshot, Value};
use metrics::Label;
use std::fmt::Write;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render the current state of `registry`.
pub fn render(registry: &Registry) -> String {
    render_snapshot(&registry.snapshot())
}

pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut output = String::with_capacity(4096);
    for family in &snapshot.families {
        write_family(&mut output, family);
    }
    output
}

fn write_family(output: &mut String, family: &Family) {
    if family.series.is_empty() {
        return;
    }

    let name = &family.name;
    if let Some(help) = &family.help {
        let _ = writeln!(output, "# HELP {name} {}", escape_help(help));
    }
    let _ = writeln!(output, "# TYPE {name} {}", family.kind.as_str());

    for series in &family.series {
        write_series(output, name, series);
    }
}

fn write_series(output: &mut String, name: &str, series: &Series) {
    match &series.value {
        Value::Counter(value) | Value::Gauge(value) => {
            write_sample(output, name, &series.labels, None, *value);
        }
        Value::Histogram(histogram) => {
            let bucket = format!("{name}_bucket");
            let bounds = histogram.bounds.iter().map(|bound| format_value(*bound));
            let bounds = bounds.chain(std::iter::once("+Inf".to_owned()));
            for (le, count) in bounds.zip(histogram.cumulative()) {
                write_sample(output, &bucket, &series.labels, Some(&le), count as f64);
            }
            write_sample(
                output,
                &format!("{name}_sum"),
                &series.labels,
                None,
                histogram.sum,
            );
            write_sample(
                output,
                &format!("{name}_count"),
                &series.labels,
                None,
                histogram.count() as f64,
            );
        }
    }
}

fn write_sample(output: &mut String, name: &str, labels: &[Label], le: Option<&str>, value: f64) {
    output.push_str(name);
    if !labels.is_empty() || le.is_some() {
        output.push('{');
        let mut first = true;
        let pairs = labels
            .iter()
            .map(|label| (label.key(), label.value()))
            .chain(le.map(|le| ("le", le)));
        for (key, label_value) in pairs {
            if !first {
                output.push(',');
            }
            first = false;
            let _ = write!(output, "{key}=\"{}\"", escape_label_value(label_value));
        }
        output.push('}');
    }
    let _ = writeln!(output, " {}", format_value(value));
}

/// Shortest round-trip decimal, with the exposition spellings of the
/// non-finite values.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value == f64::INFINITY {
        "+Inf".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_owned()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
