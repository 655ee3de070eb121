use std::f64::consts::PI;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::format_fixed_len;
use crate::sample::{Range, data_range_sorted, sort_samples};
use crate::scale::LinearScale;

pub const DEFAULT_PLOT_WIDTH: usize = 345;
pub const DEFAULT_PLOT_HEIGHT: usize = 240;

/// Percentile slice used when no explicit range is given.
pub const TRIM_PMIN: f64 = 0.1;
pub const TRIM_PMAX: f64 = 0.9;
/// Span widening factor applied after trimming.
pub const TRIM_WIDEN: f64 = 2.0;

/// Duration the drawing surface should animate between successive
/// curves.
pub const TRANSITION: Duration = Duration::from_millis(1000);

/// Vector plot geometry for a density curve.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Layout {
    pub width: usize,
    pub height: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            width: DEFAULT_PLOT_WIDTH,
            height: DEFAULT_PLOT_HEIGHT,
        }
    }
}

/// Normal-reference rule-of-thumb bandwidth (nrd0):
/// `0.9 * min(stddev, iqr / 1.34) * n^(-1/5)`, with fallbacks through
/// the standard deviation, `|x[0]|` and finally 1 when each in turn is
/// zero.
pub fn nrd0(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 1.0;
    }

    let hi = std_dev(sorted);
    let mut lo = hi.min(iqr(sorted) / 1.34);
    if lo == 0.0 || lo.is_nan() {
        lo = hi;
        if lo == 0.0 {
            lo = sorted[0].abs();
        }
        if lo == 0.0 {
            lo = 1.0;
        }
    }

    0.9 * lo * (n as f64).powf(-0.2)
}

fn std_dev(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }

    let mean = samples.iter().sum::<f64>() / n as f64;
    let sum_sq = samples
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>();

    (sum_sq / (n - 1) as f64).sqrt()
}

/// Linear-interpolated quantile over a sorted slice (type 7).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if q <= 0.0 {
        return sorted[0];
    }
    if q >= 1.0 {
        return sorted[n - 1];
    }

    let index = q * (n - 1) as f64;
    let lo = index.floor() as usize;
    let frac = index - lo as f64;
    if frac == 0.0 || lo + 1 >= n {
        sorted[lo]
    } else {
        sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
    }
}

fn iqr(sorted: &[f64]) -> f64 {
    quantile(sorted, 0.75) - quantile(sorted, 0.25)
}

fn gaussian(u: f64) -> f64 {
    (-0.5 * u * u).exp() / (2.0 * PI).sqrt()
}

fn density(sorted: &[f64], bandwidth: f64, x: f64) -> f64 {
    let sum: f64 = sorted
        .iter()
        .map(|xi| gaussian((x - xi) / bandwidth))
        .sum();
    sum / (bandwidth * sorted.len() as f64)
}

/// Smoothed probability density curve re-derived from each polled
/// sample window.
///
/// With a degenerate range hint the domain auto-ranges by percentile
/// trimming and only the retained central samples feed the estimator;
/// with an explicit range the samples are trimmed to it instead. The
/// curve is evaluated at `width + 1` evenly spaced points and closed at
/// the domain boundaries for a filled rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Kde {
    layout: Layout,
    curve: Vec<(f64, f64)>,
    range: Option<Range>,
    y_max: f64,
    x_scale: Option<LinearScale>,
    y_scale: Option<LinearScale>,
}

impl Kde {
    pub fn new(layout: Layout) -> Self {
        Kde {
            layout,
            curve: Vec::new(),
            range: None,
            y_max: 0.0,
            x_scale: None,
            y_scale: None,
        }
    }

    pub fn range(&self) -> Option<Range> {
        self.range
    }

    pub fn y_max(&self) -> f64 {
        self.y_max
    }

    /// How long the drawing surface should animate between the previous
    /// curve and this one.
    pub fn transition(&self) -> Duration {
        TRANSITION
    }

    /// The evaluated `(value, density)` points, without the closing
    /// boundary points. Empty before the first draw and whenever no
    /// sample survives range filtering.
    pub fn curve(&self) -> &[(f64, f64)] {
        &self.curve
    }

    /// Recomputes the curve from a fresh sample window. `hint` is the
    /// metric's range hint; equal endpoints request auto-ranging.
    pub fn draw(&mut self, samples: &[f64], hint: Range) {
        let mut sorted = sort_samples(samples);

        let range = if hint.is_degenerate() {
            let (range, (lo, hi)) = data_range_sorted(&sorted, TRIM_PMIN, TRIM_PMAX, TRIM_WIDEN);
            sorted = sorted[lo..hi].to_vec();
            range
        } else {
            let lo = sorted.partition_point(|v| *v < hint.min);
            let hi = sorted.partition_point(|v| *v <= hint.max);
            sorted.truncate(hi);
            sorted.drain(..lo.min(sorted.len()));
            hint
        };

        self.range = Some(range);

        if sorted.is_empty() {
            // nothing left to estimate from; show no curve
            self.curve.clear();
            self.y_max = 0.0;
            self.x_scale = None;
            self.y_scale = None;
            return;
        }

        let bandwidth = nrd0(&sorted);
        let w = self.layout.width;
        let step = range.span() / w as f64;

        self.curve = (0..=w)
            .map(|i| {
                let x = range.min + step * i as f64;
                (x, density(&sorted, bandwidth, x))
            })
            .collect();

        self.y_max = self.curve.iter().map(|p| p.1).fold(0.0, f64::max);

        self.x_scale = Some(LinearScale::new(
            (range.min, range.max),
            (0.0, w as f64),
        ));
        self.y_scale = Some(
            LinearScale::new((0.0, self.y_max), (self.layout.height as f64, 0.0))
                .nice()
                .clamped(),
        );
    }

    /// The `(value, density)` pair under a horizontal pixel, `None`
    /// outside the plot or before the first draw.
    pub fn value_at(&self, px: usize) -> Option<(f64, f64)> {
        self.curve.get(px).copied()
    }

    /// The filled curve in pixel space: the evaluated points mapped
    /// through both scales, closed with zero-density corners at the
    /// domain boundaries.
    pub fn path(&self) -> Vec<(f64, f64)> {
        let (Some(range), Some(xs), Some(ys)) = (self.range, self.x_scale, self.y_scale) else {
            return Vec::new();
        };

        let mut path = Vec::with_capacity(self.curve.len() + 2);
        path.push((xs.scale(range.min), ys.scale(0.0)));
        path.extend(
            self.curve
                .iter()
                .map(|(x, y)| (xs.scale(*x), ys.scale(*y))),
        );
        path.push((xs.scale(range.max), ys.scale(0.0)));
        path
    }

    /// Density-axis grid line values (5 nice ticks).
    pub fn y_ticks(&self) -> Vec<f64> {
        self.y_scale.map_or_else(Vec::new, |s| s.ticks(5))
    }

    pub fn y_tick_pixel(&self, tick: f64) -> Option<f64> {
        self.y_scale.map(|s| s.scale(tick))
    }

    /// Value-axis labels at the domain's min, midpoint and max.
    pub fn x_labels(&self) -> Option<[String; 3]> {
        let range = self.range?;
        Some([
            format_fixed_len(range.min),
            format_fixed_len(range.midpoint()),
            format_fixed_len(range.max),
        ])
    }
}
