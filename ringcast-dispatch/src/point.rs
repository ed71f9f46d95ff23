use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single metric sample.
///
/// The `key` identifies the series the sample belongs to and is what the
/// ring routes on. Points are plain values, every sub-batch owns its points.
pub struct MetricPoint {
    /// The routing key of the series.
    pub key: String,
    /// The metric name.
    pub metric: String,
    /// The series labels.
    pub tags: BTreeMap<String, String>,
    /// Unix timestamp of the sample in seconds.
    pub timestamp: i64,
    /// The sampled value.
    pub value: f64,
}

impl MetricPoint {
    /// Creates a new point, deriving the routing key from the metric name
    /// and its tags.
    pub fn new<I, K, V>(metric: impl Into<String>, tags: I, timestamp: i64, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let metric = metric.into();
        let tags = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<BTreeMap<_, _>>();

        Self {
            key: series_key(&metric, &tags),
            metric,
            tags,
            timestamp,
            value,
        }
    }

    #[inline]
    /// The bytes the ring routes the point on.
    pub fn routing_key(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

/// The identity of a series: `metric/k1=v1,k2=v2` with the tags sorted by
/// name, or the bare metric name when the series has no tags.
pub fn series_key(metric: &str, tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return metric.to_string();
    }

    let mut key = String::with_capacity(metric.len() + tags.len() * 16);
    key.push_str(metric);
    key.push('/');
    for (i, (name, value)) in tags.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}
