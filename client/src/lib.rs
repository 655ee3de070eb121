pub mod client;

pub use client::{ClientError, MetricsClient};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Metric classes the server registers, as reported by `/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Distribution,
    Gauge,
    Meter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Distribution => write!(f, "distribution"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Meter => write!(f, "meter"),
        }
    }
}

/// The `{Type, Value}` envelope every dashboard endpoint responds with,
/// flattened into a tagged snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "Type", content = "Value")]
pub enum MetricSnapshot {
    #[serde(rename = "counter")]
    Counter(CounterSnapshot),
    #[serde(rename = "distribution")]
    Distribution(DistributionSnapshot),
    #[serde(rename = "distribution_samples", alias = "distribution_sample")]
    Samples(SampleSet),
    #[serde(rename = "gauge")]
    Gauge(GaugeSnapshot),
    #[serde(rename = "meter")]
    Meter(MeterSnapshot),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CounterSnapshot {
    #[serde(rename = "Value")]
    pub value: i64,
    #[serde(rename = "LastUpdated", default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DistributionSnapshot {
    #[serde(rename = "Count")]
    pub count: u64,
    #[serde(rename = "Mean")]
    pub mean: f64,
    #[serde(rename = "Variance")]
    pub variance: f64,
    #[serde(rename = "StandardDeviation")]
    pub standard_deviation: f64,
    #[serde(rename = "Skewness")]
    pub skewness: f64,
    #[serde(rename = "Kurtosis")]
    pub kurtosis: f64,
    /// Values at the server's fixed percentile points:
    /// 0, 25, 50, 75, 95, 99, 99.9, 100.
    #[serde(rename = "Percentiles")]
    pub percentiles: Vec<i64>,
    #[serde(rename = "PopulationSize")]
    pub population_size: f64,
    /// Sliding-window length in nanoseconds, as the server reports it.
    #[serde(rename = "Window")]
    pub window_ns: i64,
    /// Equal endpoints mean no hint; graphs auto-range from data.
    #[serde(rename = "RangeHint")]
    pub range_hint: [f64; 2],
    #[serde(rename = "LastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl DistributionSnapshot {
    pub fn window(&self) -> Duration {
        Duration::from_nanos(self.window_ns.max(0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GaugeSnapshot {
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "LastUpdated", default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeterSnapshot {
    #[serde(rename = "Value")]
    pub value: i64,
    #[serde(rename = "LastUpdated")]
    pub last_updated: DateTime<Utc>,
    /// Indexed by derivative order (0 = value, 1 = rate of change),
    /// then averaging span (0 = instantaneous, then 1/5/15 minutes).
    #[serde(rename = "Derivatives")]
    pub derivatives: Vec<Vec<f64>>,
}

impl MeterSnapshot {
    pub fn derivative(&self, order: usize, span: usize) -> Option<f64> {
        self.derivatives.get(order)?.get(span).copied()
    }
}

/// Raw samples for an interval plus the true population count of that
/// interval. A negative count marks an invalid interval; callers treat
/// it as "skip this refresh".
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleSet {
    #[serde(rename = "Samples")]
    pub samples: Vec<i64>,
    #[serde(rename = "Count")]
    pub count: i64,
}

impl SampleSet {
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|&v| v as f64).collect()
    }
}
