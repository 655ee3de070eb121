use client::{
    CounterSnapshot, DistributionSnapshot, GaugeSnapshot, MeterSnapshot, MetricSnapshot,
};
use data::format::{format_duration, format_fixed_len};

use crate::scheduler::GraphId;

/// Longest gauge string rendered before truncation.
const GAUGE_VALUE_LIMIT: usize = 100;

/// One table row per registered metric. The variant fixes the column
/// set; distribution rows additionally remember which graph panels are
/// toggled on for them.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRow {
    Counter {
        name: String,
    },
    Distribution {
        name: String,
        heatmap: Option<GraphId>,
        kde: Option<GraphId>,
    },
    Gauge {
        name: String,
    },
    Meter {
        name: String,
    },
}

impl MetricRow {
    pub fn name(&self) -> &str {
        match self {
            MetricRow::Counter { name }
            | MetricRow::Distribution { name, .. }
            | MetricRow::Gauge { name }
            | MetricRow::Meter { name } => name,
        }
    }

    /// Renders the row's cells from a fresh snapshot. A snapshot of the
    /// wrong kind (the server re-registered the name) yields just the
    /// name cell until the next `/list` reconciliation.
    pub fn cells(&self, snapshot: &MetricSnapshot) -> Vec<String> {
        match (self, snapshot) {
            (MetricRow::Counter { name }, MetricSnapshot::Counter(c)) => counter_cells(name, c),
            (MetricRow::Distribution { name, .. }, MetricSnapshot::Distribution(d)) => {
                distribution_cells(name, d)
            }
            (MetricRow::Gauge { name }, MetricSnapshot::Gauge(g)) => gauge_cells(name, g),
            (MetricRow::Meter { name }, MetricSnapshot::Meter(m)) => meter_cells(name, m),
            _ => vec![self.name().to_string()],
        }
    }

    /// Column headers for this row's kind, aligned with [`Self::cells`].
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            MetricRow::Counter { .. } => &["name", "value", "updated"],
            MetricRow::Distribution { .. } => &[
                "name", "count", "mean", "var", "stddev", "skew", "kurt", "min", "max", "median",
                "25%", "75%", "95%", "99%", "99.9%", "window",
            ],
            MetricRow::Gauge { .. } => &["name", "value", "updated"],
            MetricRow::Meter { .. } => &[
                "name", "value", "avg(1m)", "avg(5m)", "avg(15m)", "rate", "rate(1m)", "rate(5m)",
                "rate(15m)", "updated",
            ],
        }
    }
}

fn counter_cells(name: &str, c: &CounterSnapshot) -> Vec<String> {
    vec![
        name.to_string(),
        c.value.to_string(),
        c.last_updated
            .map_or_else(String::new, |t| t.format("%H:%M:%S").to_string()),
    ]
}

/// Statistical summary columns. The percentile vector is indexed by the
/// server's fixed points 0/25/50/75/95/99/99.9/100.
fn distribution_cells(name: &str, d: &DistributionSnapshot) -> Vec<String> {
    let pct = |i: usize| {
        d.percentiles
            .get(i)
            .map_or_else(String::new, |v| format_fixed_len(*v as f64))
    };

    vec![
        name.to_string(),
        d.count.to_string(),
        format_fixed_len(d.mean),
        format_fixed_len(d.variance),
        format_fixed_len(d.standard_deviation),
        format_fixed_len(d.skewness),
        format_fixed_len(d.kurtosis),
        pct(0),
        pct(7),
        pct(2),
        pct(1),
        pct(3),
        pct(4),
        pct(5),
        pct(6),
        format_duration(d.window_ns as f64),
    ]
}

fn gauge_cells(name: &str, g: &GaugeSnapshot) -> Vec<String> {
    let mut value = g.value.clone();
    if value.chars().count() > GAUGE_VALUE_LIMIT {
        value = value.chars().take(GAUGE_VALUE_LIMIT).collect();
        value.push('…');
    }

    vec![
        name.to_string(),
        value,
        g.last_updated
            .map_or_else(String::new, |t| t.format("%H:%M:%S").to_string()),
    ]
}

/// Value, the 1/5/15-minute averages, the instantaneous and averaged
/// rates of change, and the update time.
fn meter_cells(name: &str, m: &MeterSnapshot) -> Vec<String> {
    let d = |order: usize, span: usize| {
        m.derivative(order, span)
            .map_or_else(String::new, format_fixed_len)
    };

    vec![
        name.to_string(),
        m.value.to_string(),
        d(0, 1),
        d(0, 2),
        d(0, 3),
        d(1, 0),
        d(1, 1),
        d(1, 2),
        d(1, 3),
        m.last_updated.format("%H:%M:%S").to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn distribution() -> DistributionSnapshot {
        DistributionSnapshot {
            count: 412,
            mean: 14.25,
            variance: 3.1,
            standard_deviation: 1.7606,
            skewness: 0.02,
            kurtosis: -0.4,
            percentiles: vec![1, 12, 14, 16, 18, 21, 25, 40],
            population_size: 90310.5,
            window_ns: 600_000_000_000,
            range_hint: [0.0, 0.0],
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn distribution_cells_follow_the_summary_column_order() {
        let row = MetricRow::Distribution {
            name: "latency".to_string(),
            heatmap: None,
            kde: None,
        };
        let cells = row.cells(&MetricSnapshot::Distribution(distribution()));

        assert_eq!(cells.len(), row.headers().len());
        assert_eq!(cells[0], "latency");
        assert_eq!(cells[1], "412");
        assert_eq!(cells[2], "14.2500");
        // min, max, median come from percentile points 0, 7 and 2
        assert_eq!(cells[7], "1.00000");
        assert_eq!(cells[8], "40.0000");
        assert_eq!(cells[9], "14.0000");
        // quartiles and tail percentiles
        assert_eq!(cells[10], "12.0000");
        assert_eq!(cells[11], "16.0000");
        assert_eq!(cells[12], "18.0000");
        assert_eq!(cells[13], "21.0000");
        assert_eq!(cells[14], "25.0000");
        assert_eq!(cells[15], "10m");
    }

    #[test]
    fn meter_cells_expose_averages_and_rates() {
        let row = MetricRow::Meter {
            name: "bytes".to_string(),
        };
        let snapshot = MetricSnapshot::Meter(MeterSnapshot {
            value: 1024,
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap(),
            derivatives: vec![
                vec![1024.0, 900.0, 800.0, 700.0],
                vec![3.5, 3.1, 2.8, 2.0],
            ],
        });

        let cells = row.cells(&snapshot);
        assert_eq!(cells.len(), row.headers().len());
        assert_eq!(cells[1], "1024");
        assert_eq!(cells[2], "900.000");
        assert_eq!(cells[5], "3.50000");
        assert_eq!(cells[8], "2.00000");
        assert_eq!(cells[9], "12:30:15");
    }

    #[test]
    fn meter_with_missing_derivatives_renders_empty_cells() {
        let row = MetricRow::Meter {
            name: "bytes".to_string(),
        };
        let snapshot = MetricSnapshot::Meter(MeterSnapshot {
            value: 7,
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            derivatives: vec![vec![7.0]],
        });

        let cells = row.cells(&snapshot);
        assert_eq!(cells[2], "");
        assert_eq!(cells[5], "");
    }

    #[test]
    fn long_gauge_values_are_truncated() {
        let row = MetricRow::Gauge {
            name: "status".to_string(),
        };
        let snapshot = MetricSnapshot::Gauge(GaugeSnapshot {
            value: "x".repeat(300),
            last_updated: None,
        });

        let cells = row.cells(&snapshot);
        assert_eq!(cells[1].chars().count(), GAUGE_VALUE_LIMIT + 1);
        assert!(cells[1].ends_with('…'));
        assert_eq!(cells[2], "");
    }

    #[test]
    fn kind_mismatch_degrades_to_the_name_cell() {
        let row = MetricRow::Counter {
            name: "reqs".to_string(),
        };
        let snapshot = MetricSnapshot::Gauge(GaugeSnapshot {
            value: "oops".to_string(),
            last_updated: None,
        });

        assert_eq!(row.cells(&snapshot), vec!["reqs".to_string()]);
    }
}
