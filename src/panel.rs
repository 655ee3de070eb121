use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use client::{ClientError, MetricsClient, SampleSet};
use data::heatmap::{self, Heatmap};
use data::kde::{self, Kde};
use data::sample::{Range, SampleWindow, data_range};

use crate::scheduler::{GraphId, adaptive_interval};

/// Sample limits per fetch: live heatmap refreshes pull a bounded batch
/// per column; range derivation and density curves pull a wide batch.
const COLUMN_SAMPLE_LIMIT: u64 = 100;
const WIDE_SAMPLE_LIMIT: u64 = 1000;

/// Percentile slice for deriving a heatmap value axis from data when
/// the metric carries no range hint.
const HEATMAP_TRIM_PMIN: f64 = 0.2;
const HEATMAP_TRIM_PMAX: f64 = 0.8;
const HEATMAP_TRIM_WIDEN: f64 = 2.0;

/// Collaborator repacking the graph tile grid whenever a panel is
/// added or removed.
pub trait Reflow {
    fn reflow(&self);
}

/// A live visualization instance, shared between the dashboard and its
/// in-flight refresh tasks. All mutation happens on one thread; the
/// `RefCell` is never held across an await point.
#[derive(Clone)]
pub enum Graph {
    Heatmap(Rc<RefCell<HeatmapPanel>>),
    Kde(Rc<RefCell<KdePanel>>),
}

impl Graph {
    pub fn heatmap(panel: HeatmapPanel) -> Self {
        Graph::Heatmap(Rc::new(RefCell::new(panel)))
    }

    pub fn kde(panel: KdePanel) -> Self {
        Graph::Kde(Rc::new(RefCell::new(panel)))
    }

    pub fn id(&self) -> GraphId {
        match self {
            Graph::Heatmap(p) => p.borrow().id,
            Graph::Kde(p) => p.borrow().id,
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            Graph::Heatmap(p) => p.borrow().interval,
            Graph::Kde(p) => p.borrow().interval,
        }
    }

    /// Marks the instance dead so late fetch completions are dropped.
    pub fn teardown(&self) {
        match self {
            Graph::Heatmap(p) => p.borrow_mut().teardown(),
            Graph::Kde(p) => p.borrow_mut().teardown(),
        }
    }

    /// One scheduled refresh: fetch, then apply if the panel is still
    /// live. Failures degrade to "nothing updates this tick".
    pub async fn refresh(self, client: MetricsClient, now: DateTime<Utc>) {
        match self {
            Graph::Heatmap(panel) => HeatmapPanel::refresh_at(&panel, &client, now).await,
            Graph::Kde(panel) => KdePanel::refresh(&panel, &client).await,
        }
    }
}

/// Heatmap instance for one distribution metric: owns the scrolling
/// aggregator plus the polling interval the scheduler derived for it.
pub struct HeatmapPanel {
    id: GraphId,
    metric: String,
    heatmap: Heatmap,
    interval: Duration,
    live: bool,
}

impl HeatmapPanel {
    pub fn new(metric: &str, range: Range, layout: heatmap::Layout, interval: Duration) -> Self {
        HeatmapPanel {
            id: Uuid::new_v4(),
            metric: metric.to_string(),
            heatmap: Heatmap::new(range, layout),
            interval,
            live: true,
        }
    }

    pub fn heatmap(&self) -> &Heatmap {
        &self.heatmap
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn teardown(&mut self) {
        self.live = false;
    }

    /// Builds a panel for a metric and backfills it: derives the value
    /// axis (range hint, else percentile trimming over a wide sample
    /// batch), sizes the polling interval from the metric's reporting
    /// window, then replays retrospective range queries so the heatmap
    /// starts full instead of scrolling in from empty.
    pub async fn preload(
        client: &MetricsClient,
        metric: &str,
        base: Duration,
        layout: heatmap::Layout,
    ) -> Result<Rc<RefCell<HeatmapPanel>>, ClientError> {
        let snapshot = client.distribution(metric).await?;
        let batch = client.samples(metric, WIDE_SAMPLE_LIMIT, None).await?;

        let hint = Range::new(snapshot.range_hint[0], snapshot.range_hint[1]);
        let range = if hint.is_degenerate() {
            data_range(
                &batch.values(),
                HEATMAP_TRIM_PMIN,
                HEATMAP_TRIM_PMAX,
                HEATMAP_TRIM_WIDEN,
            )
            .0
        } else {
            hint
        };

        let window = snapshot.window();
        let resolution = layout.resolution();
        let interval = adaptive_interval(window, resolution, base);

        let panel = Rc::new(RefCell::new(HeatmapPanel::new(
            metric, range, layout, interval,
        )));

        let now = Utc::now();
        for i in (0..=resolution as u32).rev() {
            if interval * i > window {
                continue;
            }
            let end = now - TimeDelta::milliseconds((interval * i).as_millis() as i64);
            HeatmapPanel::refresh_at(&panel, client, end).await;
        }

        Ok(panel)
    }

    /// Fetches the column ending at `end` and ingests it. A failed or
    /// degenerate response (negative population) skips this refresh;
    /// the next tick is the implicit retry.
    pub async fn refresh_at(panel: &Rc<RefCell<HeatmapPanel>>, client: &MetricsClient, end: DateTime<Utc>) {
        let (metric, interval, resolution, live) = {
            let p = panel.borrow();
            (
                p.metric.clone(),
                p.interval,
                p.heatmap.resolution(),
                p.live,
            )
        };
        if !live {
            return;
        }

        let step = TimeDelta::milliseconds(interval.as_millis() as i64);
        let begin = end - step;
        let newest = end;
        let oldest = end - step * (resolution as i32 - 1);

        match client
            .samples(&metric, COLUMN_SAMPLE_LIMIT, Some((begin, end)))
            .await
        {
            Ok(batch) => panel.borrow_mut().apply_window(&batch, newest, oldest),
            Err(err) => log::warn!("heatmap refresh for {metric} failed: {err}"),
        }
    }

    /// Ingests a fetched sample batch. Late completions against a
    /// torn-down panel and invalid intervals are dropped silently.
    pub fn apply_window(&mut self, batch: &SampleSet, newest: DateTime<Utc>, oldest: DateTime<Utc>) {
        if !self.live || batch.count < 0 {
            return;
        }

        let window = SampleWindow::new(batch.values(), batch.count as f64);
        self.heatmap.ingest(&window, newest, oldest);
    }
}

/// Density-curve instance for one distribution metric. Redraws are
/// expensive, so these poll at the slowest cadence.
pub struct KdePanel {
    id: GraphId,
    metric: String,
    kde: Kde,
    /// Range hint re-applied on every draw; degenerate means
    /// auto-range.
    hint: Range,
    interval: Duration,
    live: bool,
}

impl KdePanel {
    pub fn new(metric: &str, hint: Range, layout: kde::Layout, interval: Duration) -> Self {
        KdePanel {
            id: Uuid::new_v4(),
            metric: metric.to_string(),
            kde: Kde::new(layout),
            hint,
            interval,
            live: true,
        }
    }

    pub fn kde(&self) -> &Kde {
        &self.kde
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn teardown(&mut self) {
        self.live = false;
    }

    /// Builds a panel and draws the first curve immediately.
    pub async fn create(
        client: &MetricsClient,
        metric: &str,
        interval: Duration,
        layout: kde::Layout,
    ) -> Result<Rc<RefCell<KdePanel>>, ClientError> {
        let snapshot = client.distribution(metric).await?;
        let hint = Range::new(snapshot.range_hint[0], snapshot.range_hint[1]);

        let panel = Rc::new(RefCell::new(KdePanel::new(metric, hint, layout, interval)));
        KdePanel::refresh(&panel, client).await;

        Ok(panel)
    }

    pub async fn refresh(panel: &Rc<RefCell<KdePanel>>, client: &MetricsClient) {
        let (metric, live) = {
            let p = panel.borrow();
            (p.metric.clone(), p.live)
        };
        if !live {
            return;
        }

        match client.samples(&metric, WIDE_SAMPLE_LIMIT, None).await {
            Ok(batch) => panel.borrow_mut().apply_samples(&batch),
            Err(err) => log::warn!("density refresh for {metric} failed: {err}"),
        }
    }

    /// Redraws from a fetched sample batch unless the panel was torn
    /// down while the fetch was in flight.
    pub fn apply_samples(&mut self, batch: &SampleSet) {
        if !self.live || batch.count < 0 {
            return;
        }
        self.kde.draw(&batch.values(), self.hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use data::heatmap::Hover;

    fn batch(samples: Vec<i64>, count: i64) -> SampleSet {
        SampleSet { samples, count }
    }

    fn bounds() -> (DateTime<Utc>, DateTime<Utc>) {
        let newest = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        (newest, newest - TimeDelta::seconds(68))
    }

    fn heatmap_panel() -> HeatmapPanel {
        HeatmapPanel::new(
            "latency",
            Range::new(0.0, 100.0),
            heatmap::Layout::default(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn apply_window_ingests_a_column() {
        let mut panel = heatmap_panel();
        let (newest, oldest) = bounds();

        panel.apply_window(&batch(vec![10, 20, 30], 300), newest, oldest);

        assert_eq!(panel.heatmap().column_count(), 1);
        assert_eq!(panel.heatmap().window_population(), 300.0);
    }

    #[test]
    fn negative_population_skips_the_refresh() {
        let mut panel = heatmap_panel();
        let (newest, oldest) = bounds();

        panel.apply_window(&batch(vec![10], -1), newest, oldest);

        assert_eq!(panel.heatmap().column_count(), 0);
    }

    #[test]
    fn late_completion_after_teardown_mutates_nothing() {
        let mut panel = heatmap_panel();
        let (newest, oldest) = bounds();
        panel.apply_window(&batch(vec![10, 20], 2), newest, oldest);

        let before = panel.heatmap().clone();
        panel.teardown();

        // response arrives after the toggle-off
        panel.apply_window(&batch(vec![50, 60, 70], 5000), newest, oldest);

        assert!(!panel.is_live());
        assert_eq!(panel.heatmap(), &before);
        assert!(matches!(
            panel.heatmap().query_at(344, 50),
            Hover::Bin(_) | Hover::NoData
        ));
    }

    #[test]
    fn kde_panel_draws_and_respects_teardown() {
        let mut panel = KdePanel::new(
            "latency",
            Range::new(0.0, 0.0),
            kde::Layout::default(),
            Duration::from_secs(10),
        );

        panel.apply_samples(&batch((0..100).collect(), 100));
        assert!(!panel.kde().curve().is_empty());

        let before = panel.kde().clone();
        panel.teardown();
        panel.apply_samples(&batch(vec![1, 2, 3], 3));

        assert_eq!(panel.kde(), &before);
    }

    #[test]
    fn kde_negative_count_skips_the_redraw() {
        let mut panel = KdePanel::new(
            "latency",
            Range::new(0.0, 0.0),
            kde::Layout::default(),
            Duration::from_secs(10),
        );

        panel.apply_samples(&batch(vec![1, 2, 3], -1));
        assert!(panel.kde().curve().is_empty());
    }
}
