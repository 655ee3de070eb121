use crate::sample::{Range, SampleWindow};

pub const DEFAULT_NBINS: usize = 20;

/// Fixed bin edges for histogram columns: `nbins + 1` ascending
/// thresholds, the first `-inf` and the last `+inf`, with the interior
/// edges evenly spaced over the configured value range. Every column of
/// a heatmap shares one `Thresholds` so columns stay comparable.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    edges: Vec<f64>,
}

impl Thresholds {
    pub fn new(range: Range, nbins: usize) -> Self {
        debug_assert!(nbins >= 3, "need at least one interior bin");

        let mut edges = Vec::with_capacity(nbins + 1);
        edges.push(f64::NEG_INFINITY);
        for i in 0..nbins - 1 {
            edges.push(range.min + range.span() * i as f64 / (nbins - 2) as f64);
        }
        edges.push(f64::INFINITY);

        Thresholds { edges }
    }

    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn lower(&self, bin: usize) -> f64 {
        self.edges[bin]
    }

    /// Upper bound of a bin, `+inf` for the last one.
    pub fn upper(&self, bin: usize) -> f64 {
        self.edges[bin + 1]
    }

    fn bin_for(&self, v: f64) -> usize {
        self.edges
            .partition_point(|edge| *edge <= v)
            .saturating_sub(1)
            .min(self.nbins() - 1)
    }

    /// Bins a sample window into one histogram column, rescaling counts
    /// by `real_count / sample_count` so displayed magnitudes reflect
    /// the true population rather than the subsample the server sent.
    /// An empty window yields all-zero bins with `total = real_count`.
    pub fn bin(&self, window: &SampleWindow) -> HistogramColumn {
        let mut bins: Vec<Bin> = (0..self.nbins())
            .map(|i| Bin {
                lower: self.lower(i),
                count: 0.0,
            })
            .collect();

        for &v in window.samples() {
            bins[self.bin_for(v)].count += 1.0;
        }

        if !window.is_empty() {
            let scale = window.real_count() / window.len() as f64;
            for bin in &mut bins {
                bin.count *= scale;
            }
        }

        HistogramColumn {
            bins,
            total: window.real_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub lower: f64,
    /// Population-rescaled occupancy, not the raw sample count.
    pub count: f64,
}

/// One time-slice of a heatmap: binned counts scaled to the true
/// population of the interval they cover.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramColumn {
    pub bins: Vec<Bin>,
    pub total: f64,
}

impl HistogramColumn {
    pub fn count_sum(&self) -> f64 {
        self.bins.iter().map(|bin| bin.count).sum()
    }
}
