//! Flatten parsed metric families into timestamped samples.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Report};
use tracing::debug;

use crate::exposition::{MetricFamily, MetricKind, RawSample};

/// Reserved label holding a sample's metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Labels of one sample, including `__name__`, ordered by label name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn metric_name(&self) -> &str {
        self.get(METRIC_NAME_LABEL).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Renders as `name{a="1", b="2"}`, or just `name` without other labels.
impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.metric_name())?;
        let mut labels = self
            .iter()
            .filter(|(n, _)| *n != METRIC_NAME_LABEL)
            .peekable();
        if labels.peek().is_none() {
            return Ok(());
        }
        write!(f, "{{")?;
        for (i, (name, value)) in labels.enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: LabelSet,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn metric_name(&self) -> &str {
        self.labels.metric_name()
    }

    fn from_raw(raw: &RawSample, timestamp: DateTime<Utc>) -> Self {
        Self::with_labels(&raw.name, raw.labels.iter().cloned(), raw.value, timestamp)
    }

    fn with_labels(
        name: &str,
        labels: impl IntoIterator<Item = (String, String)>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let labels = labels
            .into_iter()
            .chain(std::iter::once((
                METRIC_NAME_LABEL.to_owned(),
                name.to_owned(),
            )))
            .collect();
        Self {
            labels,
            value,
            timestamp,
        }
    }
}

/// Extract samples from every family, skipping families that cannot be converted.
pub fn extract_all(families: &[MetricFamily], scrape_time: DateTime<Utc>) -> Vec<Sample> {
    families
        .iter()
        .flat_map(|family| match extract_samples(family, scrape_time) {
            Ok(samples) => samples,
            Err(err) => {
                debug!(family = %family.name, %err, "skipping metric family");
                Vec::new()
            }
        })
        .collect()
}

/// Extract the samples of a single family. Samples without an explicit timestamp are stamped
/// with `scrape_time`.
pub fn extract_samples(
    family: &MetricFamily,
    scrape_time: DateTime<Utc>,
) -> Result<Vec<Sample>, Report> {
    match family.kind() {
        MetricKind::Counter | MetricKind::Gauge | MetricKind::Untyped => family
            .samples
            .iter()
            .map(|raw| -> Result<Sample, Report> {
                Ok(Sample::from_raw(raw, timestamp(raw, scrape_time)?))
            })
            .collect(),
        MetricKind::Summary => extract_summary(family, scrape_time),
        MetricKind::Histogram => extract_histogram(family, scrape_time),
    }
}

fn timestamp(raw: &RawSample, scrape_time: DateTime<Utc>) -> Result<DateTime<Utc>, Report> {
    match raw.timestamp_ms {
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| eyre!("timestamp {} of {} is out of range", ms, raw.name)),
        None => Ok(scrape_time),
    }
}

/// The bucket bound or quantile of a histogram or summary sample, `None` when the label is
/// absent.
fn bound(raw: &RawSample, label: &str) -> Result<Option<f64>, Report> {
    raw.label(label)
        .map(|value| {
            value
                .parse::<f64>()
                .map_err(|_| eyre!("sample {} has invalid {} {:?}", raw.name, label, value))
        })
        .transpose()
}

/// Shortest rendering of a bucket bound or quantile, so `le="1.0"` and `le="1"` label the same
/// series. Exponents below -4 or from 6 up use exponent form, and infinities are `+Inf`/`-Inf`.
pub fn format_bound(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0. { "+Inf" } else { "-Inf" }.to_owned();
    }
    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    match exponent.parse::<i32>() {
        Ok(exp) if !(-4..6).contains(&exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        _ => value.to_string(),
    }
}

fn with_bound(raw: &RawSample, label: &str, value: f64, ts: DateTime<Utc>) -> Sample {
    let labels = raw.labels.iter().map(|(n, v)| {
        if n == label {
            (n.clone(), format_bound(value))
        } else {
            (n.clone(), v.clone())
        }
    });
    Sample::with_labels(&raw.name, labels, raw.value, ts)
}

fn skip_line(raw: &RawSample, family: &MetricFamily, reason: &str) {
    debug!(sample = %raw.name, family = %family.name, reason, "skipping sample");
}

fn extract_summary(
    family: &MetricFamily,
    scrape_time: DateTime<Utc>,
) -> Result<Vec<Sample>, Report> {
    let sum = format!("{}_sum", family.name);
    let count = format!("{}_count", family.name);

    let mut samples = Vec::with_capacity(family.samples.len());
    for raw in &family.samples {
        let ts = timestamp(raw, scrape_time)?;
        if raw.name == sum || raw.name == count {
            samples.push(Sample::from_raw(raw, ts));
        } else if let Some(quantile) = bound(raw, "quantile")? {
            samples.push(with_bound(raw, "quantile", quantile, ts));
        } else {
            skip_line(raw, family, "no quantile label");
        }
    }
    Ok(samples)
}

/// One histogram series: the bucket labels minus `le`.
struct BucketSeries {
    labels: Vec<(String, String)>,
    inf_seen: bool,
    count: Option<(f64, DateTime<Utc>)>,
}

fn series_index(series: &mut Vec<BucketSeries>, raw: &RawSample) -> usize {
    let mut labels: Vec<_> = raw
        .labels
        .iter()
        .filter(|(n, _)| n != "le")
        .cloned()
        .collect();
    labels.sort();
    match series.iter().position(|s| s.labels == labels) {
        Some(idx) => idx,
        None => {
            series.push(BucketSeries {
                labels,
                inf_seen: false,
                count: None,
            });
            series.len() - 1
        }
    }
}

fn extract_histogram(
    family: &MetricFamily,
    scrape_time: DateTime<Utc>,
) -> Result<Vec<Sample>, Report> {
    let bucket = format!("{}_bucket", family.name);
    let sum = format!("{}_sum", family.name);
    let count = format!("{}_count", family.name);

    let mut series: Vec<BucketSeries> = Vec::new();
    let mut samples = Vec::with_capacity(family.samples.len());
    for raw in &family.samples {
        let ts = timestamp(raw, scrape_time)?;
        if raw.name == bucket {
            let Some(upper) = bound(raw, "le")? else {
                skip_line(raw, family, "no le label");
                continue;
            };
            let idx = series_index(&mut series, raw);
            series[idx].inf_seen |= upper == f64::INFINITY;
            samples.push(with_bound(raw, "le", upper, ts));
        } else if raw.name == count {
            let idx = series_index(&mut series, raw);
            series[idx].count = Some((raw.value, ts));
            samples.push(Sample::from_raw(raw, ts));
        } else if raw.name == sum {
            samples.push(Sample::from_raw(raw, ts));
        } else {
            skip_line(raw, family, "not a bucket, sum or count");
        }
    }

    // an exporter may omit the +Inf bucket; it always equals the count
    for s in series {
        if let (false, Some((value, ts))) = (s.inf_seen, s.count) {
            let labels = s
                .labels
                .into_iter()
                .chain(std::iter::once(("le".to_owned(), format_bound(f64::INFINITY))));
            samples.push(Sample::with_labels(&bucket, labels, value, ts));
        }
    }
    Ok(samples)
}
