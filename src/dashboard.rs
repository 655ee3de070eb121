use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::spawn_local;
use tokio::time::{MissedTickBehavior, interval};

use client::{ClientError, MetricKind, MetricsClient};
use data::Config;

use crate::panel::{Graph, HeatmapPanel, KdePanel, Reflow};
use crate::row::MetricRow;
use crate::scheduler::Scheduler;

/// Reflow collaborator for the headless binary: a repack is just an
/// announcement of the new panel count.
pub struct LogReflow;

impl Reflow for LogReflow {
    fn reflow(&self) {
        log::info!("graph layout changed; repacking tiles");
    }
}

/// Where rendered table rows go each cadence.
pub trait TableSink {
    fn render(&mut self, rows: &[Vec<String>]);
}

/// Tab-separated rows on stdout, one line per metric.
pub struct StdoutTable;

impl TableSink for StdoutTable {
    fn render(&mut self, rows: &[Vec<String>]) {
        for cells in rows {
            println!("{}", cells.join("\t"));
        }
    }
}

/// The dashboard event loop: one table row per registered metric, a
/// scheduler driving per-graph refreshes off a shared base ticker, and
/// a reflow collaborator notified whenever panels come or go.
///
/// Everything runs on the current thread inside a `LocalSet`; refresh
/// tasks are `spawn_local` so panel state needs no locking.
pub struct Dashboard {
    client: MetricsClient,
    config: Config,
    rows: Vec<MetricRow>,
    scheduler: Scheduler,
    layout: Rc<dyn Reflow>,
    table: Box<dyn TableSink>,
}

impl Dashboard {
    pub fn new(
        client: MetricsClient,
        config: Config,
        layout: Rc<dyn Reflow>,
        table: Box<dyn TableSink>,
    ) -> Self {
        Dashboard {
            client,
            config,
            rows: Vec::new(),
            scheduler: Scheduler::new(),
            layout,
            table,
        }
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    /// Fetches the metric registry and runs the polling loop until the
    /// task is cancelled.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.sync_rows().await?;

        // every distribution starts with both graphs visible
        let names: Vec<String> = self
            .rows
            .iter()
            .filter(|row| matches!(row, MetricRow::Distribution { .. }))
            .map(|row| row.name().to_string())
            .collect();
        for name in names {
            if let Err(err) = self.enable_heatmap(&name).await {
                log::warn!("heatmap for {name} disabled: {err}");
            }
            if let Err(err) = self.enable_kde(&name).await {
                log::warn!("density curve for {name} disabled: {err}");
            }
        }

        let base = Duration::from_millis(self.config.intervals.heatmap_ms);
        let mut graph_tick = interval(base);
        graph_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut table_tick = interval(Duration::from_millis(self.config.intervals.table_ms));
        table_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = table_tick.tick() => {
                    if let Err(err) = self.refresh_table().await {
                        log::warn!("table refresh failed: {err}");
                    }
                }
                _ = graph_tick.tick() => {
                    self.tick_graphs(base);
                }
            }
        }
    }

    /// Builds the row list from `/list`, sorted by name for a stable
    /// table order.
    async fn sync_rows(&mut self) -> Result<(), ClientError> {
        let mut listed = self.client.list().await?;
        listed.sort_by(|a, b| a.0.cmp(&b.0));

        self.rows = listed
            .into_iter()
            .map(|(name, kind)| match kind {
                MetricKind::Counter => MetricRow::Counter { name },
                MetricKind::Distribution => MetricRow::Distribution {
                    name,
                    heatmap: None,
                    kde: None,
                },
                MetricKind::Gauge => MetricRow::Gauge { name },
                MetricKind::Meter => MetricRow::Meter { name },
            })
            .collect();

        Ok(())
    }

    /// Spawns a refresh task for every graph the scheduler reports due.
    fn tick_graphs(&mut self, base: Duration) {
        let now = Utc::now();
        for graph in self.scheduler.tick(base) {
            let id = graph.id();
            let task = spawn_local(graph.refresh(self.client.clone(), now));
            self.scheduler.set_inflight(id, task);
        }
    }

    /// Polls `/all` and prints the table. Rows whose metric vanished
    /// from the server render as a bare name until the registry is
    /// re-synced.
    async fn refresh_table(&mut self) -> Result<(), ClientError> {
        let snapshots = self.client.all().await?;

        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| match snapshots.get(row.name()) {
                Some(snapshot) => row.cells(snapshot),
                None => vec![row.name().to_string()],
            })
            .collect();
        self.table.render(&rendered);

        if log::log_enabled!(log::Level::Debug) {
            self.log_graph_annotations();
        }

        Ok(())
    }

    fn log_graph_annotations(&self) {
        for row in &self.rows {
            let MetricRow::Distribution { heatmap, kde, .. } = row else {
                continue;
            };

            if let Some(Graph::Heatmap(panel)) = heatmap.and_then(|id| self.scheduler.graph(id)) {
                let panel = panel.borrow();
                if let Some(labels) = panel.heatmap().axis_labels() {
                    log::debug!(
                        "{} heatmap spans {} to {}",
                        panel.metric(),
                        labels.time[0],
                        labels.time[2],
                    );
                }
            }

            if let Some(Graph::Kde(panel)) = kde.and_then(|id| self.scheduler.graph(id)) {
                let panel = panel.borrow();
                if let Some(labels) = panel.kde().x_labels() {
                    log::debug!(
                        "{} density over [{}, {}]",
                        panel.metric(),
                        labels[0],
                        labels[2],
                    );
                }
            }
        }
    }

    /// Creates, preloads and schedules a heatmap for a distribution
    /// metric. A second enable for the same metric is a no-op.
    pub async fn enable_heatmap(&mut self, name: &str) -> Result<(), ClientError> {
        let Some(MetricRow::Distribution { heatmap, .. }) = self.find_distribution(name) else {
            return Ok(());
        };
        if heatmap.is_some() {
            return Ok(());
        }

        let base = Duration::from_millis(self.config.intervals.heatmap_ms);
        let panel =
            HeatmapPanel::preload(&self.client, name, base, self.config.heatmap).await?;
        let graph = Graph::Heatmap(panel);
        let id = graph.id();

        self.scheduler.register(graph);
        if let Some(MetricRow::Distribution { heatmap, .. }) = self.find_distribution(name) {
            *heatmap = Some(id);
        }
        log::info!("heatmap enabled for {name}; {} graphs live", self.scheduler.len());
        self.layout.reflow();

        Ok(())
    }

    /// Unschedules a heatmap; its in-flight fetch, if any, is aborted.
    pub fn disable_heatmap(&mut self, name: &str) {
        let Some(MetricRow::Distribution { heatmap, .. }) = self.find_distribution(name) else {
            return;
        };
        let Some(id) = heatmap.take() else {
            return;
        };

        self.scheduler.unregister(id);
        self.layout.reflow();
    }

    pub async fn enable_kde(&mut self, name: &str) -> Result<(), ClientError> {
        let Some(MetricRow::Distribution { kde, .. }) = self.find_distribution(name) else {
            return Ok(());
        };
        if kde.is_some() {
            return Ok(());
        }

        let interval = Duration::from_millis(self.config.intervals.kde_ms);
        let panel = KdePanel::create(&self.client, name, interval, self.config.kde).await?;
        let graph = Graph::Kde(panel);
        let id = graph.id();

        self.scheduler.register(graph);
        if let Some(MetricRow::Distribution { kde, .. }) = self.find_distribution(name) {
            *kde = Some(id);
        }
        log::info!("density curve enabled for {name}; {} graphs live", self.scheduler.len());
        self.layout.reflow();

        Ok(())
    }

    pub fn disable_kde(&mut self, name: &str) {
        let Some(MetricRow::Distribution { kde, .. }) = self.find_distribution(name) else {
            return;
        };
        let Some(id) = kde.take() else {
            return;
        };

        self.scheduler.unregister(id);
        self.layout.reflow();
    }

    fn find_distribution(&mut self, name: &str) -> Option<&mut MetricRow> {
        self.rows
            .iter_mut()
            .find(|row| matches!(row, MetricRow::Distribution { .. }) && row.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data::sample::Range;

    fn dashboard_with_rows(rows: Vec<MetricRow>) -> Dashboard {
        let client = MetricsClient::new("http://127.0.0.1:8080").expect("valid url");
        let mut dashboard = Dashboard::new(
            client,
            Config::default(),
            Rc::new(LogReflow),
            Box::new(StdoutTable),
        );
        dashboard.rows = rows;
        dashboard
    }

    fn registered_heatmap(dashboard: &mut Dashboard, name: &str) -> crate::scheduler::GraphId {
        let panel = HeatmapPanel::new(
            name,
            Range::new(0.0, 100.0),
            dashboard.config.heatmap,
            Duration::from_secs(1),
        );
        let graph = Graph::heatmap(panel);
        let id = graph.id();
        dashboard.scheduler.register(graph);
        id
    }

    #[test]
    fn disable_unregisters_the_panel_and_clears_the_toggle() {
        let mut dashboard = dashboard_with_rows(vec![MetricRow::Distribution {
            name: "latency".to_string(),
            heatmap: None,
            kde: None,
        }]);

        let id = registered_heatmap(&mut dashboard, "latency");
        if let Some(MetricRow::Distribution { heatmap, .. }) =
            dashboard.find_distribution("latency")
        {
            *heatmap = Some(id);
        }

        dashboard.disable_heatmap("latency");

        assert!(!dashboard.scheduler.contains(id));
        assert!(matches!(
            dashboard.rows()[0],
            MetricRow::Distribution { heatmap: None, .. }
        ));
    }

    #[test]
    fn disable_without_an_enabled_panel_is_a_no_op() {
        let mut dashboard = dashboard_with_rows(vec![MetricRow::Distribution {
            name: "latency".to_string(),
            heatmap: None,
            kde: None,
        }]);

        dashboard.disable_heatmap("latency");
        dashboard.disable_kde("latency");
        dashboard.disable_heatmap("missing");

        assert!(dashboard.scheduler.is_empty());
    }
}
