use serde::{Deserialize, Serialize};

/// Value-axis bounds. Equal endpoints mean "derive the range from data",
/// matching the range-hint convention of the metrics server.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Range { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// A bounded, time-ordered batch of raw samples plus the true population
/// count they were drawn from. The server may subsample an interval, so
/// `real_count` can exceed `samples.len()`; displayed magnitudes must be
/// rescaled to the true population.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    samples: Vec<f64>,
    real_count: f64,
}

impl SampleWindow {
    pub fn new(samples: Vec<f64>, real_count: f64) -> Self {
        let real_count = real_count.max(samples.len() as f64);
        SampleWindow {
            samples,
            real_count,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn real_count(&self) -> f64 {
        self.real_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub fn sort_samples(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Derives a display range from data when no usable range hint exists:
/// keep the `[pmin, pmax]` percentile slice of the sorted samples, then
/// widen the span symmetrically by `widen`. Returns the range and the
/// `[lo, hi)` slice of `sorted` that was retained.
///
/// A zero-width slice gets a synthetic span so downstream estimation
/// never sees an empty domain.
pub fn data_range(samples: &[f64], pmin: f64, pmax: f64, widen: f64) -> (Range, (usize, usize)) {
    data_range_sorted(&sort_samples(samples), pmin, pmax, widen)
}

/// Same as [`data_range`], but assumes `sorted` is already in ascending
/// order.
pub fn data_range_sorted(
    sorted: &[f64],
    pmin: f64,
    pmax: f64,
    widen: f64,
) -> (Range, (usize, usize)) {
    let n = sorted.len();

    if n == 0 {
        return (Range::new(-10.0, 10.0), (0, 0));
    }

    let lo = (((n as f64) * pmin).floor() as usize).min(n - 1);
    let hi = ((((n as f64) * pmax).ceil() as usize).max(lo + 1)).min(n);

    let mut smin = sorted[lo];
    let mut smax = sorted[hi - 1];

    if smin == smax {
        if smax < 0.0 {
            smin = 2.0 * smin;
            smax = 0.0;
        } else if smax == 0.0 {
            smin = -10.0;
            smax = 10.0;
        } else {
            smin = 0.0;
            smax = 2.0 * smax;
        }
    }

    let adj = (smax - smin) * (widen - 1.0) / 2.0;

    (Range::new(smin - adj, smax + adj), (lo, hi))
}
