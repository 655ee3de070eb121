/// Linear mapping from a numeric domain onto pixel coordinates, with
/// d3-style domain nicing and 1/2/5-stepped tick generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
    clamp: bool,
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        LinearScale {
            domain,
            range,
            clamp: false,
        }
    }

    pub fn clamped(mut self) -> Self {
        self.clamp = true;
        self
    }

    /// Extends the domain outward to round values, one order of
    /// magnitude below the span.
    pub fn nice(mut self) -> Self {
        let (d0, d1) = self.domain;
        let span = (d1 - d0).abs();
        if span == 0.0 || !span.is_finite() {
            return self;
        }

        let step = 10f64.powf(span.log10().round() - 1.0);
        self.domain = ((d0 / step).floor() * step, (d1 / step).ceil() * step);
        self
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    pub fn scale(&self, v: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if d1 == d0 {
            return r0;
        }

        let mut t = (v - d0) / (d1 - d0);
        if self.clamp {
            t = t.clamp(0.0, 1.0);
        }
        r0 + t * (r1 - r0)
    }

    pub fn invert(&self, px: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if r1 == r0 {
            return d0;
        }

        let mut t = (px - r0) / (r1 - r0);
        if self.clamp {
            t = t.clamp(0.0, 1.0);
        }
        d0 + t * (d1 - d0)
    }

    /// Roughly `count` round tick values covering the domain, stepped by
    /// 1, 2 or 5 times a power of ten.
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        let (d0, d1) = self.domain;
        let span = d1 - d0;
        if span <= 0.0 || !span.is_finite() || count == 0 {
            return Vec::new();
        }

        let mut step = 10f64.powf((span / count as f64).log10().floor());
        let err = count as f64 / span * step;
        if err <= 0.15 {
            step *= 10.0;
        } else if err <= 0.35 {
            step *= 5.0;
        } else if err <= 0.75 {
            step *= 2.0;
        }

        let mut ticks = Vec::new();
        let mut v = (d0 / step).ceil() * step;
        while v <= d1 + step * 0.5 {
            ticks.push(v);
            v += step;
        }
        ticks
    }
}
