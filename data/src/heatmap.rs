use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use palette::{FromColor, Hsl, Srgb};
use serde::{Deserialize, Serialize};

use crate::format::format_fixed_len;
use crate::histogram::{DEFAULT_NBINS, HistogramColumn, Thresholds};
use crate::sample::{Range, SampleWindow};

pub const DEFAULT_PLOT_WIDTH: usize = 345;
pub const DEFAULT_PLOT_HEIGHT: usize = 100;
pub const DEFAULT_COLUMN_WIDTH: usize = 5;

pub type Color = Srgb<u8>;

const BACKGROUND: Color = Color::new(0, 0, 0);
const MARKER: Color = Color::new(255, 0, 0);

/// Raster geometry of a heatmap plot. The horizontal resolution in
/// columns is `width / column_width`; it also sizes the scheduler's
/// adaptive polling interval.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Layout {
    pub width: usize,
    pub height: usize,
    pub column_width: usize,
    pub nbins: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            width: DEFAULT_PLOT_WIDTH,
            height: DEFAULT_PLOT_HEIGHT,
            column_width: DEFAULT_COLUMN_WIDTH,
            nbins: DEFAULT_NBINS,
        }
    }
}

impl Layout {
    pub fn resolution(&self) -> usize {
        (self.width / self.column_width).max(1)
    }

    fn bin_height(&self) -> usize {
        (self.height / self.nbins).max(1)
    }
}

/// Intensity ramp for heatmap cells: dark blue at 0 sweeping to a
/// bright red at 1. Lightness is `15 + 60v` percent and hue is
/// `240 - 360v` degrees at full saturation; tests rely on the exact
/// formula for visual parity with other frontends.
pub fn colormap(v: f64) -> Color {
    let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 } as f32;

    let hue = 240.0 - 360.0 * v;
    let lightness = (15.0 + 60.0 * v) / 100.0;

    Srgb::from_color(Hsl::new(hue, 1.0, lightness)).into_format()
}

/// Fixed-size RGB pixel field the heatmap paints into. Scrolling is a
/// left shift by whole columns; no allocation happens after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<Color>,
}

impl Raster {
    fn new(width: usize, height: usize) -> Self {
        Raster {
            width,
            height,
            pixels: vec![BACKGROUND; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Color {
        self.pixels[y * self.width + x]
    }

    fn shift_left(&mut self, cols: usize) {
        for y in 0..self.height {
            let row = y * self.width;
            self.pixels.copy_within(row + cols..row + self.width, row);
        }
    }

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: Color) {
        for yy in y..(y + h).min(self.height) {
            let row = yy * self.width;
            for xx in x..(x + w).min(self.width) {
                self.pixels[row + xx] = color;
            }
        }
    }
}

/// Result of a pointer query against the plot.
#[derive(Debug, Clone, PartialEq)]
pub enum Hover {
    /// Pointer outside the plot area; any tooltip should be cleared.
    Cleared,
    /// The resolved column predates the earliest retained column.
    NoData,
    Bin(BinHover),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinHover {
    pub time: DateTime<Utc>,
    pub lower: f64,
    pub upper: f64,
    /// Population-rescaled occupancy of the bin.
    pub count: f64,
    /// Share of the bin's own column, floored to whole percent as
    /// displayed.
    pub pct_of_column: f64,
    /// Share of the whole visible window.
    pub pct_of_window: f64,
}

/// Axis annotations for the current frame: oldest/mid/newest timestamps
/// along the bottom, range min/mid/max along the side.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabels {
    pub time: [String; 3],
    pub value: [String; 3],
}

/// Scrolling time-by-value intensity raster built from successive
/// histogram columns.
///
/// Ingesting a column shifts the visible field left by one column width
/// and paints the new column at the right edge. The running window
/// population is kept in sync with eviction, so the intensity
/// normalization `count / population * visible_columns` stays exact as
/// old columns fall off the left.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    layout: Layout,
    range: Range,
    thresholds: Thresholds,
    columns: VecDeque<HistogramColumn>,
    window_population: f64,
    raster: Raster,
    newest: Option<DateTime<Utc>>,
    oldest: Option<DateTime<Utc>>,
}

impl Heatmap {
    pub fn new(range: Range, layout: Layout) -> Self {
        Heatmap {
            layout,
            range,
            thresholds: Thresholds::new(range, layout.nbins),
            columns: VecDeque::with_capacity(layout.resolution() + 1),
            window_population: 0.0,
            raster: Raster::new(layout.width, layout.height),
            newest: None,
            oldest: None,
        }
    }

    pub fn resolution(&self) -> usize {
        self.layout.resolution()
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn window_population(&self) -> f64 {
        self.window_population
    }

    /// Bins a freshly polled sample window into a column, appends it and
    /// repaints. `newest`/`oldest` are the time bounds of the visible
    /// window after this ingest.
    pub fn ingest(&mut self, window: &SampleWindow, newest: DateTime<Utc>, oldest: DateTime<Utc>) {
        let column = self.thresholds.bin(window);
        self.push_column(column);

        self.newest = Some(newest);
        self.oldest = Some(oldest);

        self.paint_latest();
    }

    fn push_column(&mut self, column: HistogramColumn) {
        self.window_population += column.total;
        self.columns.push_back(column);

        while self.columns.len() > self.layout.resolution() {
            if let Some(evicted) = self.columns.pop_front() {
                self.window_population -= evicted.total;
            }
        }
    }

    fn paint_latest(&mut self) {
        let Some(column) = self.columns.back() else {
            return;
        };

        let visible = self.columns.len() as f64;
        let population = self.window_population;
        let intensities: Vec<f64> = column
            .bins
            .iter()
            .map(|bin| {
                if population == 0.0 {
                    0.0
                } else {
                    bin.count / population * visible
                }
            })
            .collect();

        let col_w = self.layout.column_width;
        let bin_h = self.layout.bin_height();
        let x0 = self.layout.width - col_w;

        self.raster.shift_left(col_w);
        for (i, v) in intensities.iter().enumerate() {
            let y = (self.layout.nbins - i - 1) * bin_h;
            self.raster.fill_rect(x0, y, col_w, bin_h, colormap(*v));
        }

        // 1px rules over the open-ended underflow/overflow bins
        self.raster.fill_rect(x0, bin_h - 1, col_w, 1, MARKER);
        self.raster
            .fill_rect(x0, (self.layout.nbins - 1) * bin_h, col_w, 1, MARKER);
    }

    /// Labels for the surrounding axes, `None` before the first ingest.
    pub fn axis_labels(&self) -> Option<AxisLabels> {
        let (newest, oldest) = (self.newest?, self.oldest?);
        let mid = oldest + (newest - oldest) / 2;

        let fmt = |t: DateTime<Utc>| t.format("%H:%M:%S").to_string();

        Some(AxisLabels {
            time: [fmt(oldest), fmt(mid), fmt(newest)],
            value: [
                format_fixed_len(self.range.min),
                format_fixed_len(self.range.midpoint()),
                format_fixed_len(self.range.max),
            ],
        })
    }

    /// Maps plot pixel coordinates back to the bin under the pointer.
    pub fn query_at(&self, x: usize, y: usize) -> Hover {
        if x >= self.layout.width || y >= self.layout.height {
            return Hover::Cleared;
        }

        let (Some(newest), Some(oldest)) = (self.newest, self.oldest) else {
            return Hover::NoData;
        };

        // a width that is not a whole multiple of the column width leaves
        // a partial trailing column that maps past the buffer
        let idx = (x / self.layout.column_width) as isize + self.columns.len() as isize
            - self.layout.resolution() as isize;
        if idx < 0 || idx as usize >= self.columns.len() {
            return Hover::NoData;
        }
        let column = &self.columns[idx as usize];

        let span_ms = (newest - oldest).num_milliseconds() as f64;
        let offset_ms = (x as f64 / self.layout.width as f64 * span_ms) as i64;
        let time = oldest + TimeDelta::milliseconds(offset_ms);

        let j = ((self.layout.height - y - 1) as f64 / self.layout.height as f64
            * self.layout.nbins as f64)
            .floor() as usize;
        let j = j.min(self.layout.nbins - 1);
        let bin = column.bins[j];

        let pct_of_column = if column.total > 0.0 {
            (100.0 * bin.count / column.total).floor()
        } else {
            0.0
        };
        let pct_of_window = if self.window_population > 0.0 {
            100.0 * bin.count / self.window_population
        } else {
            0.0
        };

        Hover::Bin(BinHover {
            time,
            lower: bin.lower,
            upper: self.thresholds.upper(j),
            count: bin.count,
            pct_of_column,
            pct_of_window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(samples: Vec<f64>, real_count: f64) -> SampleWindow {
        SampleWindow::new(samples, real_count)
    }

    fn times(i: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        (base + TimeDelta::seconds(i), base + TimeDelta::seconds(i - 60))
    }

    fn heatmap() -> Heatmap {
        Heatmap::new(Range::new(0.0, 18.0), Layout::default())
    }

    #[test]
    fn default_layout_resolution_is_69_columns() {
        assert_eq!(Layout::default().resolution(), 69);
    }

    #[test]
    fn population_tracks_retained_columns_without_eviction() {
        let mut h = heatmap();

        let mut expected = 0.0;
        for i in 0..25 {
            let (newest, oldest) = times(i);
            h.ingest(&window(vec![1.0, 5.0, 9.0], 10.0 + i as f64), newest, oldest);
            expected += 10.0 + i as f64;
        }

        assert_eq!(h.column_count(), 25);
        assert_eq!(h.window_population(), expected);
    }

    #[test]
    fn eviction_bounds_buffer_and_population() {
        let mut h = heatmap();
        let resolution = h.resolution();

        for i in 0..(resolution as i64 + 40) {
            let (newest, oldest) = times(i);
            h.ingest(&window(vec![2.0], 1.0), newest, oldest);
        }

        assert_eq!(h.column_count(), resolution);
        // each retained column contributes exactly 1.0
        assert!((h.window_population() - resolution as f64).abs() < 1e-9);
    }

    #[test]
    fn query_before_earliest_column_is_no_data() {
        let mut h = heatmap();
        let (newest, oldest) = times(0);
        h.ingest(&window(vec![3.0], 1.0), newest, oldest);

        // one column present: only the rightmost pixel column has data
        assert_eq!(h.query_at(0, 50), Hover::NoData);

        let rightmost = DEFAULT_PLOT_WIDTH - 1;
        assert!(matches!(h.query_at(rightmost, 50), Hover::Bin(_)));
    }

    #[test]
    fn query_in_a_partial_trailing_column_is_no_data() {
        // width not a whole multiple of the column width, as a hand-edited
        // config can produce: the last pixel column is partial
        let layout = Layout {
            width: 346,
            ..Layout::default()
        };
        let mut h = Heatmap::new(Range::new(0.0, 18.0), layout);

        for i in 0..layout.resolution() as i64 {
            let (newest, oldest) = times(i);
            h.ingest(&window(vec![2.0], 1.0), newest, oldest);
        }

        // x = 345 resolves one column past the full buffer
        assert_eq!(h.query_at(345, 50), Hover::NoData);
        assert!(matches!(h.query_at(344, 50), Hover::Bin(_)));
    }

    #[test]
    fn query_outside_plot_clears() {
        let h = heatmap();
        assert_eq!(h.query_at(DEFAULT_PLOT_WIDTH, 0), Hover::Cleared);
        assert_eq!(h.query_at(0, DEFAULT_PLOT_HEIGHT), Hover::Cleared);
    }

    #[test]
    fn query_resolves_bin_interval_and_shares() {
        let mut h = heatmap();
        let (newest, oldest) = times(0);
        // 4 samples, bin [4, 5) holds 2 of them
        h.ingest(&window(vec![4.1, 4.9, 9.5, 17.0], 4.0), newest, oldest);

        // bin j=5 covers [4, 5); its pixel rows are y in [70, 75)
        let hover = h.query_at(DEFAULT_PLOT_WIDTH - 1, 72);
        let Hover::Bin(bin) = hover else {
            panic!("expected a bin hover");
        };

        assert_eq!(bin.lower, 4.0);
        assert_eq!(bin.upper, 5.0);
        assert_eq!(bin.count, 2.0);
        assert_eq!(bin.pct_of_column, 50.0);
        assert_eq!(bin.pct_of_window, 50.0);
    }

    #[test]
    fn colormap_endpoints_match_the_documented_ramp() {
        // v=0: hsl(240, 100%, 15%) -> dark blue
        let low = colormap(0.0);
        assert_eq!((low.red, low.green, low.blue), (0, 0, 77));

        // v=1: hsl(-120, 100%, 75%), which normalizes to a light blue
        let high = colormap(1.0);
        assert_eq!((high.red, high.green, high.blue), (128, 128, 255));
    }

    #[test]
    fn colormap_follows_the_nominal_hue_sweep() {
        // measured hue must track 240 - 360v (mod 360) across the ramp
        for i in 0..=10 {
            let v = i as f64 / 10.0;
            let c: Srgb<f32> = colormap(v).into_format();
            let measured = Hsl::from_color(c).hue.into_positive_degrees();
            let nominal = (240.0 - 360.0 * v as f32).rem_euclid(360.0);

            let diff = (measured - nominal).abs();
            let circular = diff.min(360.0 - diff);
            assert!(circular < 1.0, "v={v}: hue {measured} vs {nominal}");
        }
    }

    #[test]
    fn raster_scrolls_left_on_ingest() {
        let mut h = heatmap();
        let (newest, oldest) = times(0);
        h.ingest(&window(vec![9.0], 1.0), newest, oldest);

        // the hot cell sits in the rightmost column; bin [9, 10) is j=10,
        // rows y in [45, 50)
        let hot = h.raster().get(DEFAULT_PLOT_WIDTH - 1, 47);
        assert_ne!(hot, BACKGROUND);

        let (newest, oldest) = times(1);
        h.ingest(&window(vec![], 0.0), newest, oldest);

        // after one scroll the hot cell moved one column width left
        let shifted = h
            .raster()
            .get(DEFAULT_PLOT_WIDTH - 1 - DEFAULT_COLUMN_WIDTH, 47);
        assert_eq!(shifted, hot);
    }
}
