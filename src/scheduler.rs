use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::panel::Graph;

pub type GraphId = Uuid;

/// The coarsest multiple of the base tick that still yields one fresh
/// column per pixel-column across the metric's reporting window. Short
/// windows clamp to one base tick.
pub fn adaptive_interval(window: Duration, resolution: usize, base: Duration) -> Duration {
    let base_ms = base.as_millis().max(1) as u64;
    let per_column = window.as_millis() as u64 / resolution.max(1) as u64 / base_ms;

    Duration::from_millis(per_column.max(1) * base_ms)
}

struct Entry {
    graph: Graph,
    interval: Duration,
    remaining: Duration,
    inflight: Option<JoinHandle<()>>,
}

/// Owns the polling entry of every live graph instance. One global
/// ticker fires at the base cadence; each entry counts down
/// independently, so heterogeneous refresh intervals share a single
/// timer.
#[derive(Default)]
pub struct Scheduler {
    entries: FxHashMap<GraphId, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Registers a graph under its own refresh interval. The first
    /// refresh fires on the next tick.
    pub fn register(&mut self, graph: Graph) {
        let entry = Entry {
            interval: graph.interval(),
            remaining: Duration::ZERO,
            inflight: None,
            graph,
        };
        self.entries.insert(entry.graph.id(), entry);
    }

    /// Synchronously removes an entry, aborts its in-flight fetch and
    /// marks the graph dead so a completion that already left the
    /// network cannot mutate torn-down state.
    pub fn unregister(&mut self, id: GraphId) {
        if let Some(entry) = self.entries.remove(&id) {
            if let Some(task) = entry.inflight {
                task.abort();
            }
            entry.graph.teardown();
        }
    }

    pub fn contains(&self, id: GraphId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.entries.get(&id).map(|entry| &entry.graph)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advances every countdown by `base` and returns the graphs due
    /// for a refresh; their countdowns reset to their own intervals.
    /// An entry whose previous fetch is still pending is skipped for
    /// this round (at most one in-flight fetch per instance).
    pub fn tick(&mut self, base: Duration) -> Vec<Graph> {
        let mut due = Vec::new();

        for entry in self.entries.values_mut() {
            entry.remaining = entry.remaining.saturating_sub(base);
            if !entry.remaining.is_zero() {
                continue;
            }
            entry.remaining = entry.interval;

            if entry.inflight.as_ref().is_some_and(|task| !task.is_finished()) {
                continue;
            }
            due.push(entry.graph.clone());
        }

        due
    }

    /// Records the refresh task spawned for a graph returned by
    /// [`Scheduler::tick`].
    pub fn set_inflight(&mut self, id: GraphId, task: JoinHandle<()>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.inflight = Some(task);
        } else {
            // unregistered between tick and spawn; suppress the refresh
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::HeatmapPanel;
    use data::heatmap::Layout;
    use data::sample::Range;

    fn graph(interval: Duration) -> Graph {
        Graph::heatmap(HeatmapPanel::new(
            "latency",
            Range::new(0.0, 100.0),
            Layout::default(),
            interval,
        ))
    }

    #[test]
    fn adaptive_interval_clamps_short_windows_to_the_base_tick() {
        let interval = adaptive_interval(
            Duration::from_millis(60_000),
            69,
            Duration::from_millis(1000),
        );
        assert_eq!(interval, Duration::from_millis(1000));
    }

    #[test]
    fn adaptive_interval_coarsens_for_long_windows() {
        let interval = adaptive_interval(
            Duration::from_millis(600_000),
            69,
            Duration::from_millis(1000),
        );
        assert_eq!(interval, Duration::from_millis(8000));
    }

    #[test]
    fn countdown_fires_on_schedule_and_resets() {
        let base = Duration::from_millis(1000);
        let mut scheduler = Scheduler::new();
        scheduler.register(graph(Duration::from_millis(3000)));

        // fresh registration fires on the first tick
        assert_eq!(scheduler.tick(base).len(), 1);

        // then every third tick
        assert!(scheduler.tick(base).is_empty());
        assert!(scheduler.tick(base).is_empty());
        assert_eq!(scheduler.tick(base).len(), 1);
    }

    #[test]
    fn entries_with_distinct_intervals_share_one_ticker() {
        let base = Duration::from_millis(1000);
        let mut scheduler = Scheduler::new();

        let fast = graph(Duration::from_millis(1000));
        let slow = graph(Duration::from_millis(2000));
        let fast_id = fast.id();
        scheduler.register(fast);
        scheduler.register(slow);

        assert_eq!(scheduler.tick(base).len(), 2);
        let due = scheduler.tick(base);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), fast_id);
    }

    #[test]
    fn unregister_is_idempotent_and_removes_the_entry() {
        let mut scheduler = Scheduler::new();
        let g = graph(Duration::from_millis(1000));
        let id = g.id();
        scheduler.register(g);

        assert!(scheduler.contains(id));
        scheduler.unregister(id);
        assert!(!scheduler.contains(id));
        scheduler.unregister(id);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn unregister_aborts_the_inflight_fetch() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let mut scheduler = Scheduler::new();
                let g = graph(Duration::from_millis(1000));
                let id = g.id();
                scheduler.register(g);

                let task = tokio::task::spawn_local(std::future::pending::<()>());
                scheduler.set_inflight(id, task);

                scheduler.unregister(id);
                // the pending task was aborted, not left dangling
                tokio::task::yield_now().await;
                assert!(scheduler.is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn pending_fetch_skips_the_next_due_tick() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let base = Duration::from_millis(1000);
                let mut scheduler = Scheduler::new();
                let g = graph(Duration::from_millis(1000));
                let id = g.id();
                scheduler.register(g);

                assert_eq!(scheduler.tick(base).len(), 1);
                scheduler.set_inflight(id, tokio::task::spawn_local(std::future::pending::<()>()));

                // still in flight: due again but suppressed
                assert!(scheduler.tick(base).is_empty());

                scheduler.unregister(id);
            })
            .await;
    }
}
